//! The dynamic object model through which all host trees are accessed.
//!
//! A host object exposes named properties and named methods, much like a [***DOM***](https://developer.mozilla.org/en-US/docs/Web/API/Document_Object_Model) object does in a browser.
//! Both the [`memory`](`crate::memory`) and the [`web`](`crate::web`) backends implement [`HostObject`],
//! and so do the interception layers ([`Proxy`](`crate::proxy::Proxy`), [`Traced`](`crate::trace::Traced`)) stacked on top of them.

use core::{
	any::Any,
	fmt::{self, Debug, Formatter},
	sync::atomic::{AtomicU64, Ordering},
};
use std::rc::Rc;
use thiserror::Error;

/// Process-unique identity of a host object.
///
/// Wrappers report the identity of the object they wrap, so identity comparisons see through interception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);
impl ObjectId {
	/// Allocates a fresh identity.
	#[must_use]
	pub fn next() -> Self {
		static NEXT: AtomicU64 = AtomicU64::new(1);
		Self(NEXT.fetch_add(1, Ordering::Relaxed))
	}

	/// Restores an identity previously obtained through [`ObjectId::get`].
	#[must_use]
	pub fn from_raw(raw: u64) -> Self {
		Self(raw)
	}

	#[must_use]
	pub fn get(self) -> u64 {
		self.0
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
	Document,
	Element,
	Text,
	Comment,
	Style,
	Function,
	Other,
}

/// A reference-counted host callback, for example an event listener.
///
/// Two [`Callback`]s are equal iff they share an allocation, which is what listener removal relies on.
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn(&[Value]) -> Result<Value, HostError>>);
impl Callback {
	pub fn new(f: impl Fn(&[Value]) -> Result<Value, HostError> + 'static) -> Self {
		Self(Rc::new(f))
	}

	/// # Errors
	///
	/// Iff the callback itself fails.
	pub fn call(&self, args: &[Value]) -> Result<Value, HostError> {
		(self.0)(args)
	}

	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		self.addr() == other.addr()
	}

	/// Address of the shared allocation, usable as a map key while the [`Callback`] is alive.
	#[must_use]
	pub fn addr(&self) -> usize {
		Rc::as_ptr(&self.0).cast::<()>() as usize
	}
}
impl Debug for Callback {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "Callback({:#x})", self.addr())
	}
}
impl PartialEq for Callback {
	fn eq(&self, other: &Self) -> bool {
		self.ptr_eq(other)
	}
}

pub type HostRef = Rc<dyn HostObject>;

#[derive(Clone)]
pub enum Value {
	Undefined,
	Null,
	Bool(bool),
	Number(f64),
	String(String),
	Object(HostRef),
	Function(Callback),
}
impl Value {
	#[must_use]
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::String(string) => Some(string),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_f64(&self) -> Option<f64> {
		match *self {
			Value::Number(number) => Some(number),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_bool(&self) -> Option<bool> {
		match *self {
			Value::Bool(value) => Some(value),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_object(&self) -> Option<&HostRef> {
		match self {
			Value::Object(object) => Some(object),
			_ => None,
		}
	}

	#[must_use]
	pub fn into_object(self) -> Option<HostRef> {
		match self {
			Value::Object(object) => Some(object),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_callback(&self) -> Option<&Callback> {
		match self {
			Value::Function(callback) => Some(callback),
			_ => None,
		}
	}

	#[must_use]
	pub fn is_nullish(&self) -> bool {
		matches!(self, Value::Undefined | Value::Null)
	}

	#[must_use]
	pub fn is_callable(&self) -> bool {
		match self {
			Value::Function(_) => true,
			Value::Object(object) => object.kind() == ObjectKind::Function,
			_ => false,
		}
	}

	/// [***ToString***](https://tc39.es/ecma262/#sec-tostring)-like conversion for attribute and style values.
	#[must_use]
	pub fn to_display_string(&self) -> String {
		match self {
			Value::Undefined => "undefined".to_owned(),
			Value::Null => "null".to_owned(),
			Value::Bool(value) => value.to_string(),
			Value::Number(number) if number.fract() == 0.0 && number.abs() < 1e15 => format!("{:.0}", number),
			Value::Number(number) => number.to_string(),
			Value::String(string) => string.clone(),
			Value::Object(object) => format!("[object {:?}]", object.kind()),
			Value::Function(_) => "function".to_owned(),
		}
	}
}
impl Debug for Value {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Value::Undefined => f.write_str("undefined"),
			Value::Null => f.write_str("null"),
			Value::Bool(value) => Debug::fmt(value, f),
			Value::Number(number) => Debug::fmt(number, f),
			#[cfg(feature = "dangerous-logging")]
			Value::String(string) => Debug::fmt(string, f),
			#[cfg(not(feature = "dangerous-logging"))]
			Value::String(string) => write!(f, "<string of length {}>", string.len()),
			Value::Object(object) => write!(f, "{:?}#{}", object.kind(), object.identity().get()),
			Value::Function(callback) => Debug::fmt(callback, f),
		}
	}
}
impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
			(Value::Bool(a), Value::Bool(b)) => a == b,
			#[allow(clippy::float_cmp)]
			(Value::Number(a), Value::Number(b)) => a == b,
			(Value::String(a), Value::String(b)) => a == b,
			(Value::Object(a), Value::Object(b)) => a.identity() == b.identity(),
			(Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
			_ => false,
		}
	}
}
impl From<&str> for Value {
	fn from(string: &str) -> Self {
		Value::String(string.to_owned())
	}
}
impl From<String> for Value {
	fn from(string: String) -> Self {
		Value::String(string)
	}
}
impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Value::Bool(value)
	}
}
impl From<f64> for Value {
	fn from(number: f64) -> Self {
		Value::Number(number)
	}
}
impl From<HostRef> for Value {
	fn from(object: HostRef) -> Self {
		Value::Object(object)
	}
}
impl From<Callback> for Value {
	fn from(callback: Callback) -> Self {
		Value::Function(callback)
	}
}
impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(option: Option<T>) -> Self {
		option.map_or(Value::Null, Into::into)
	}
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
	#[error("{kind:?} has no method {name:?}")]
	NoSuchMethod { kind: ObjectKind, name: String },
	#[error("argument {index} of {method:?} must be {expected}")]
	InvalidArgument { method: String, index: usize, expected: &'static str },
	#[error("the node to {operation} is not a child of this node")]
	NotFound { operation: &'static str },
	#[error("hierarchy request error: {0}")]
	HierarchyRequest(String),
	#[error("{0:?} is not a valid selector")]
	Syntax(String),
	#[error("property {0:?} is read-only")]
	ReadOnly(String),
	#[error("{method:?} did not return {expected}")]
	UnexpectedReturn { method: String, expected: &'static str },
	#[error("JavaScript exception: {0}")]
	Js(String),
}

/// A live object in some host tree.
pub trait HostObject: Debug {
	fn identity(&self) -> ObjectId;
	fn kind(&self) -> ObjectKind;

	/// Reads a property. Missing properties read as [`Value::Undefined`].
	fn get(&self, name: &str) -> Value;
	/// Like `name in object`.
	fn has(&self, name: &str) -> bool;
	/// # Errors
	///
	/// Iff the host rejects the assignment.
	fn set(&self, name: &str, value: Value) -> Result<(), HostError>;
	/// Returns whether a property was removed.
	fn delete(&self, name: &str) -> bool;
	/// # Errors
	///
	/// Iff the method doesn't exist or fails.
	fn call(&self, name: &str, args: &[Value]) -> Result<Value, HostError>;
	/// Enumerable property names, including methods.
	fn own_keys(&self) -> Vec<String>;

	fn as_any(&self) -> &dyn Any;
}

/// Typed helpers over the dynamic [`HostObject`] interface.
pub trait HostExt {
	fn same(&self, other: &HostRef) -> bool;
	fn is_element(&self) -> bool;
	/// Lowercased tag name of an element.
	fn tag_name(&self) -> Option<String>;
	fn parent_node(&self) -> Option<HostRef>;
	fn child_nodes(&self) -> Vec<HostRef>;
	fn style(&self) -> Option<HostRef>;
	fn is_connected(&self) -> bool;

	/// # Errors
	///
	/// Iff the host call fails.
	fn get_attribute(&self, name: &str) -> Result<Option<String>, HostError>;
	/// # Errors
	///
	/// Iff the host call fails.
	fn has_attribute(&self, name: &str) -> Result<bool, HostError>;
	/// # Errors
	///
	/// Iff the host call fails, including for invalid selectors.
	fn query_selector(&self, selector: &str) -> Result<Option<HostRef>, HostError>;
	/// # Errors
	///
	/// Iff the host call fails.
	fn append_child(&self, child: &HostRef) -> Result<(), HostError>;
	/// # Errors
	///
	/// Iff the host call fails, for example because `reference` is not a child of `self`.
	fn insert_before(&self, child: &HostRef, reference: Option<&HostRef>) -> Result<(), HostError>;
	/// # Errors
	///
	/// Iff the host call fails.
	fn remove_child(&self, child: &HostRef) -> Result<(), HostError>;
}
impl HostExt for HostRef {
	fn same(&self, other: &HostRef) -> bool {
		self.identity() == other.identity()
	}

	fn is_element(&self) -> bool {
		self.kind() == ObjectKind::Element
	}

	fn tag_name(&self) -> Option<String> {
		if !self.is_element() {
			return None;
		}
		self.get("tagName").as_str().map(str::to_ascii_lowercase)
	}

	fn parent_node(&self) -> Option<HostRef> {
		self.get("parentNode").into_object()
	}

	fn child_nodes(&self) -> Vec<HostRef> {
		let list = match self.get("childNodes").into_object() {
			Some(list) => list,
			None => return Vec::new(),
		};
		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		let length = list.get("length").as_f64().unwrap_or(0.0) as usize;
		(0..length)
			.filter_map(|i| {
				#[allow(clippy::cast_precision_loss)]
				let item = list.call("item", &[Value::Number(i as f64)]);
				item.ok().and_then(Value::into_object)
			})
			.collect()
	}

	fn style(&self) -> Option<HostRef> {
		self.get("style").into_object()
	}

	fn is_connected(&self) -> bool {
		self.get("isConnected").as_bool().unwrap_or(false)
	}

	fn get_attribute(&self, name: &str) -> Result<Option<String>, HostError> {
		Ok(self.call("getAttribute", &[name.into()])?.as_str().map(ToOwned::to_owned))
	}

	fn has_attribute(&self, name: &str) -> Result<bool, HostError> {
		Ok(self.call("hasAttribute", &[name.into()])?.as_bool().unwrap_or(false))
	}

	fn query_selector(&self, selector: &str) -> Result<Option<HostRef>, HostError> {
		Ok(self.call("querySelector", &[selector.into()])?.into_object())
	}

	fn append_child(&self, child: &HostRef) -> Result<(), HostError> {
		self.call("appendChild", &[Value::Object(child.clone())]).map(drop)
	}

	fn insert_before(&self, child: &HostRef, reference: Option<&HostRef>) -> Result<(), HostError> {
		self.call("insertBefore", &[Value::Object(child.clone()), reference.cloned().into()]).map(drop)
	}

	fn remove_child(&self, child: &HostRef) -> Result<(), HostError> {
		self.call("removeChild", &[Value::Object(child.clone())]).map(drop)
	}
}

/// Reads a string argument.
///
/// # Errors
///
/// Iff the argument is missing or not a string.
pub fn string_arg<'a>(method: &str, args: &'a [Value], index: usize) -> Result<&'a str, HostError> {
	args.get(index).and_then(Value::as_str).ok_or_else(|| HostError::InvalidArgument {
		method: method.to_owned(),
		index,
		expected: "a string",
	})
}

/// Reads an optional string argument, treating `null` and `undefined` as absent.
///
/// # Errors
///
/// Iff the argument is present but not a string.
pub fn optional_string_arg<'a>(method: &str, args: &'a [Value], index: usize) -> Result<Option<&'a str>, HostError> {
	match args.get(index) {
		None | Some(Value::Undefined | Value::Null) => Ok(None),
		Some(Value::String(string)) => Ok(Some(string)),
		Some(_) => Err(HostError::InvalidArgument {
			method: method.to_owned(),
			index,
			expected: "a string or null",
		}),
	}
}

/// The CSS property name of a style declaration property: `backgroundColor` → `background-color`.
///
/// Custom properties and names that are already hyphenated are kept as-is.
#[must_use]
pub fn to_kebab_case(name: &str) -> String {
	if name.starts_with("--") {
		return name.to_owned();
	}
	if name == "cssFloat" {
		return "float".to_owned();
	}
	let mut kebab = String::with_capacity(name.len() + 4);
	for c in name.chars() {
		if c.is_ascii_uppercase() {
			kebab.push('-');
			kebab.push(c.to_ascii_lowercase());
		} else {
			kebab.push(c);
		}
	}
	kebab
}

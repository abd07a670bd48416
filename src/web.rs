//! The browser backend: [`HostObject`] over arbitrary [`JsValue`]s.
//!
//! Properties and methods are accessed through [`Reflect`], so this backend works with whatever object model the page has, DOM or not.
//! Rust [`Callback`]s handed to JavaScript become [`Closure`]s, which are kept alive by a reference-counted registry
//! until they are passed to `removeEventListener` as often as they were passed elsewhere.

use crate::{
	host::{Callback, HostError, HostObject, HostRef, ObjectId, ObjectKind, Value},
	proxy::Proxy,
	rc_hash_map::{CountSaturatedError, RcHashMap},
	trace::Traced,
};
use core::{
	any::Any,
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use hashbrown::HashSet;
use js_sys::{Array, Function, Object, Reflect, Symbol};
use std::rc::Rc;
use tracing::{error, trace, trace_span, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};

type Listener = Closure<dyn Fn(JsValue) -> Result<JsValue, JsValue>>;

thread_local! {
	static IDENTITY_KEY: JsValue = Symbol::for_("dom-blend.identity").into();
	static LISTENERS: RefCell<RcHashMap<usize, u32, (Callback, Listener)>> = RefCell::default();
}

/// Wraps `value` (usually a DOM node) for use as a host object.
pub fn host(value: impl Into<JsValue>) -> HostRef {
	Rc::new(JsObject::new(value.into()))
}

pub struct JsObject {
	value: JsValue,
	id: ObjectId,
}
impl JsObject {
	#[must_use]
	pub fn new(value: JsValue) -> Self {
		let id = identify(&value);
		Self { value, id }
	}

	#[must_use]
	pub fn value(&self) -> &JsValue {
		&self.value
	}
}
impl Debug for JsObject {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "JsObject#{}({:?})", self.id.get(), self.kind())
	}
}

/// Reads the identity stored on `value` under a symbol, or stores a fresh one.
fn identify(value: &JsValue) -> ObjectId {
	if !value.is_object() && !value.is_function() {
		return ObjectId::next();
	}
	IDENTITY_KEY.with(|key| {
		if let Some(raw) = Reflect::get(value, key).ok().and_then(|raw| raw.as_f64()) {
			#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
			let raw = raw as u64;
			return ObjectId::from_raw(raw);
		}
		let id = ObjectId::next();
		#[allow(clippy::cast_precision_loss)]
		let raw = JsValue::from_f64(id.get() as f64);
		if !Reflect::set(value, key, &raw).unwrap_or(false) {
			warn!("Could not store an identity on a JavaScript object. It won't compare equal to itself across wrappers.");
		}
		id
	})
}

fn js_error(error: &JsValue) -> HostError {
	HostError::Js(match error.dyn_ref::<js_sys::Error>() {
		Some(error) => String::from(error.message()),
		None => format!("{:?}", error),
	})
}

/// Converts `value` for JavaScript. Callbacks are retained in the listener registry iff `retain` is set.
///
/// Returns [`None`] for host objects that don't (eventually) wrap a [`JsValue`].
fn to_js(value: &Value, retain: bool) -> Option<JsValue> {
	Some(match value {
		Value::Undefined => JsValue::UNDEFINED,
		Value::Null => JsValue::NULL,
		Value::Bool(value) => JsValue::from_bool(*value),
		Value::Number(number) => JsValue::from_f64(*number),
		Value::String(string) => JsValue::from_str(string),
		Value::Object(object) => return js_value_of(object),
		Value::Function(callback) => listener(callback, retain),
	})
}

fn js_value_of(object: &HostRef) -> Option<JsValue> {
	let any = object.as_any();
	if let Some(js) = any.downcast_ref::<JsObject>() {
		return Some(js.value.clone());
	}
	if let Some(proxy) = any.downcast_ref::<Proxy>() {
		return js_value_of(proxy.target());
	}
	any.downcast_ref::<Traced>().and_then(|traced| js_value_of(traced.inner()))
}

fn from_js(value: JsValue) -> Value {
	if value.is_undefined() {
		Value::Undefined
	} else if value.is_null() {
		Value::Null
	} else if let Some(value) = value.as_bool() {
		Value::Bool(value)
	} else if let Some(number) = value.as_f64() {
		Value::Number(number)
	} else if let Some(string) = value.as_string() {
		Value::String(string)
	} else {
		Value::Object(Rc::new(JsObject::new(value)))
	}
}

fn listener(callback: &Callback, retain: bool) -> JsValue {
	LISTENERS.with(|listeners| {
		let mut listeners = listeners.borrow_mut();
		if !retain {
			// Unknown callbacks can't have been registered anywhere, so there's nothing to match.
			return listeners.get(&callback.addr()).map_or(JsValue::NULL, |(_, closure)| closure.as_ref().clone());
		}
		match listeners.increment_or_insert_with(callback.addr(), || (callback.clone(), new_closure(callback.clone()))) {
			Ok((_, closure)) => closure.as_ref().clone(),
			Err(CountSaturatedError) => {
				error!("Listener reference count saturated.");
				JsValue::UNDEFINED
			}
		}
	})
}

fn new_closure(callback: Callback) -> Listener {
	Closure::wrap(Box::new(move |event: JsValue| {
		let span = trace_span!("Callback", ?callback);
		let _enter = span.enter();
		match callback.call(&[from_js(event)]) {
			Ok(value) => Ok(to_js(&value, true).unwrap_or(JsValue::UNDEFINED)),
			Err(error) => Err(JsValue::from_str(&error.to_string())),
		}
	}) as Box<dyn Fn(JsValue) -> Result<JsValue, JsValue>>)
}

fn release(callback: &Callback) {
	LISTENERS.with(|listeners| {
		let mut listeners = listeners.borrow_mut();
		if listeners.weak_decrement(&callback.addr()).is_err() {
			warn!("Released a callback more often than it was handed out.");
		}
		let freed = listeners.drain_weak().count();
		trace!("Freed {} event listener(s).", freed);
	});
}

fn releases(method: &str) -> bool {
	matches!(method, "removeEventListener" | "detachEvent")
}

impl HostObject for JsObject {
	fn identity(&self) -> ObjectId {
		self.id
	}

	fn kind(&self) -> ObjectKind {
		let value = &self.value;
		if value.is_instance_of::<web_sys::Document>() {
			ObjectKind::Document
		} else if value.is_instance_of::<web_sys::Element>() {
			ObjectKind::Element
		} else if value.is_instance_of::<web_sys::Text>() {
			ObjectKind::Text
		} else if value.is_instance_of::<web_sys::Comment>() {
			ObjectKind::Comment
		} else if value.is_instance_of::<web_sys::CssStyleDeclaration>() {
			ObjectKind::Style
		} else if value.is_function() {
			ObjectKind::Function
		} else {
			ObjectKind::Other
		}
	}

	fn get(&self, name: &str) -> Value {
		match Reflect::get(&self.value, &JsValue::from_str(name)) {
			Ok(value) => from_js(value),
			Err(error) => {
				trace!("Reading {:?} threw: {}", name, js_error(&error));
				Value::Undefined
			}
		}
	}

	fn has(&self, name: &str) -> bool {
		Reflect::has(&self.value, &JsValue::from_str(name)).unwrap_or(false)
	}

	fn set(&self, name: &str, value: Value) -> Result<(), HostError> {
		let value = to_js(&value, true).ok_or_else(|| HostError::InvalidArgument {
			method: name.to_owned(),
			index: 0,
			expected: "a JavaScript value",
		})?;
		if Reflect::set(&self.value, &JsValue::from_str(name), &value).map_err(|error| js_error(&error))? {
			Ok(())
		} else {
			Err(HostError::ReadOnly(name.to_owned()))
		}
	}

	fn delete(&self, name: &str) -> bool {
		self.value
			.dyn_ref::<Object>()
			.map_or(false, |object| Reflect::delete_property(object, &JsValue::from_str(name)).unwrap_or(false))
	}

	fn call(&self, name: &str, args: &[Value]) -> Result<Value, HostError> {
		let function = Reflect::get(&self.value, &JsValue::from_str(name))
			.map_err(|error| js_error(&error))?
			.dyn_into::<Function>()
			.map_err(|_| HostError::NoSuchMethod {
				kind: self.kind(),
				name: name.to_owned(),
			})?;
		let retain = !releases(name);
		let js_args = args
			.iter()
			.enumerate()
			.map(|(index, arg)| {
				to_js(arg, retain).ok_or_else(|| HostError::InvalidArgument {
					method: name.to_owned(),
					index,
					expected: "a JavaScript value",
				})
			})
			.collect::<Result<Array, _>>()?;
		let result = Reflect::apply(&function, &self.value, &js_args).map_err(|error| js_error(&error));
		if !retain {
			for callback in args.iter().filter_map(Value::as_callback) {
				release(callback);
			}
		}
		result.map(from_js)
	}

	fn own_keys(&self) -> Vec<String> {
		let mut seen = HashSet::new();
		let mut keys = Vec::new();
		let mut current = self.value.dyn_ref::<Object>().cloned();
		while let Some(object) = current {
			let prototype = Object::get_prototype_of(&object);
			// `Object.prototype` itself.
			if prototype.is_null() {
				break;
			}
			for name in Object::get_own_property_names(&object).iter() {
				if let Some(name) = name.as_string() {
					if name != "constructor" && seen.insert(name.clone()) {
						keys.push(name);
					}
				}
			}
			current = Some(prototype);
		}
		keys
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

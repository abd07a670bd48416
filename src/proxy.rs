//! Transparent, per-property interception of host objects.
//!
//! A [`Proxy`] forwards everything to its target unless its [`Policy`] says otherwise.
//! The policy is resolved into a property table once, when the target is wrapped; names the host only gains later are forwarded untouched until [`Proxy::update`] picks them up.

use crate::host::{Callback, HostError, HostObject, HostRef, ObjectId, ObjectKind, Value};
use core::{
	any::Any,
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use hashbrown::{HashMap, HashSet};
use std::rc::{Rc, Weak};
use tracing::trace;

pub type Getter = Rc<dyn Fn(&HostRef, &str) -> Value>;
pub type Setter = Rc<dyn Fn(&HostRef, &str, Value) -> Result<(), HostError>>;
pub type Invoker = Rc<dyn Fn(&HostRef, &str, &[Value]) -> Result<Value, HostError>>;
pub type Wrapper = Rc<dyn Fn(Value) -> Value>;

/// Interception hooks for one property. Each hook that is [`None`] falls back to the [`Policy`] default, then to forwarding.
#[derive(Clone, Default)]
pub struct Override {
	pub get: Option<Getter>,
	pub set: Option<Setter>,
	pub invoke: Option<Invoker>,
	pub wrap: Option<Wrapper>,
}
impl Override {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn on_get(mut self, get: impl Fn(&HostRef, &str) -> Value + 'static) -> Self {
		self.get = Some(Rc::new(get));
		self
	}

	#[must_use]
	pub fn on_set(mut self, set: impl Fn(&HostRef, &str, Value) -> Result<(), HostError> + 'static) -> Self {
		self.set = Some(Rc::new(set));
		self
	}

	#[must_use]
	pub fn on_invoke(mut self, invoke: impl Fn(&HostRef, &str, &[Value]) -> Result<Value, HostError> + 'static) -> Self {
		self.invoke = Some(Rc::new(invoke));
		self
	}

	#[must_use]
	pub fn on_wrap(mut self, wrap: impl Fn(Value) -> Value + 'static) -> Self {
		self.wrap = Some(Rc::new(wrap));
		self
	}

	fn merged_over(&self, base: &Override) -> Override {
		Override {
			get: self.get.clone().or_else(|| base.get.clone()),
			set: self.set.clone().or_else(|| base.set.clone()),
			invoke: self.invoke.clone().or_else(|| base.invoke.clone()),
			wrap: self.wrap.clone().or_else(|| base.wrap.clone()),
		}
	}
}
impl Debug for Override {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Override")
			.field("get", &self.get.is_some())
			.field("set", &self.set.is_some())
			.field("invoke", &self.invoke.is_some())
			.field("wrap", &self.wrap.is_some())
			.finish()
	}
}

#[derive(Clone, Default)]
pub struct Policy {
	overrides: HashMap<String, Override>,
	default: Override,
	extend: Vec<(&'static str, Rc<dyn Any>)>,
}
impl Policy {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Intercepts `name` specifically. Later calls for the same name replace earlier ones.
	#[must_use]
	pub fn with(mut self, name: &str, r#override: Override) -> Self {
		self.overrides.insert(name.to_owned(), r#override);
		self
	}

	/// Hooks applied to every tabled property without a specific override.
	#[must_use]
	pub fn with_default(mut self, default: Override) -> Self {
		self.default = default;
		self
	}

	/// Attaches hidden metadata, see [`Proxy::extension`].
	#[must_use]
	pub fn extend(mut self, key: &'static str, value: Rc<dyn Any>) -> Self {
		self.extend.push((key, value));
		self
	}
}

thread_local! {
	static REGISTRY: RefCell<HashMap<ObjectId, Weak<Proxy>>> = RefCell::new(HashMap::new());
}

pub struct Proxy {
	this: Weak<Proxy>,
	target: HostRef,
	default: Override,
	overrides: HashMap<String, Override>,
	table: RefCell<HashMap<String, Override>>,
	extensions: HashMap<&'static str, Rc<dyn Any>>,
}

/// Wraps `target` according to `policy`.
///
/// Wrapping is idempotent: While a wrapper for `target` is alive, it is returned as-is and `policy` is discarded.
/// Wrapping a [`Proxy`] returns that same [`Proxy`].
pub fn wrap(target: HostRef, policy: Policy) -> Rc<Proxy> {
	if let Some(proxy) = downcast(&target) {
		return proxy;
	}

	let identity = target.identity();
	if let Some(existing) = REGISTRY.with(|registry| registry.borrow().get(&identity).and_then(Weak::upgrade)) {
		trace!(identity = identity.get(), "Reusing existing wrapper.");
		return existing;
	}

	let Policy { overrides, default, extend } = policy;
	let proxy = Rc::new_cyclic(|this| {
		let proxy = Proxy {
			this: this.clone(),
			table: RefCell::new(HashMap::new()),
			target,
			default,
			overrides,
			extensions: extend.into_iter().collect(),
		};
		let names = proxy.target.own_keys().into_iter().chain(proxy.overrides.keys().cloned()).collect::<Vec<_>>();
		proxy.update(names);
		proxy
	});

	REGISTRY.with(|registry| {
		let mut registry = registry.borrow_mut();
		if registry.len() == registry.capacity() {
			registry.retain(|_, proxy| proxy.strong_count() > 0);
		}
		registry.insert(identity, Rc::downgrade(&proxy));
	});
	trace!(identity = identity.get(), kind = ?proxy.target.kind(), "Wrapped host object.");
	proxy
}

/// Strips one layer of wrapping.
#[must_use]
pub fn unwrap(value: &Value) -> Value {
	match value {
		Value::Object(object) => match object.as_any().downcast_ref::<Proxy>() {
			Some(proxy) => Value::Object(proxy.target.clone()),
			None => value.clone(),
		},
		_ => value.clone(),
	}
}

#[must_use]
pub fn unwrap_args(args: &[Value]) -> Vec<Value> {
	args.iter().map(unwrap).collect()
}

#[must_use]
pub fn as_proxy(value: &Value) -> Option<Rc<Proxy>> {
	value.as_object().and_then(downcast)
}

/// The live wrapper of `target`, if there is one. `target` may itself be that wrapper.
#[must_use]
pub fn existing(target: &HostRef) -> Option<Rc<Proxy>> {
	downcast(target).or_else(|| REGISTRY.with(|registry| registry.borrow().get(&target.identity()).and_then(Weak::upgrade)))
}

fn downcast(object: &HostRef) -> Option<Rc<Proxy>> {
	object.as_any().downcast_ref::<Proxy>().and_then(|proxy| proxy.this.upgrade())
}

impl Proxy {
	/// The wrapped host object.
	#[must_use]
	pub fn target(&self) -> &HostRef {
		&self.target
	}

	/// Hidden metadata attached through [`Policy::extend`].
	#[must_use]
	pub fn extension<T: Any>(&self, key: &str) -> Option<Rc<T>> {
		self.extensions.get(key).cloned()?.downcast::<T>().ok()
	}

	/// Whether accesses to `name` go through the property table.
	#[must_use]
	pub fn is_intercepted(&self, name: &str) -> bool {
		self.table.borrow().contains_key(name)
	}

	/// Adds property table entries for `names`, which may have appeared on the target after it was wrapped.
	pub fn update<I, S>(&self, names: I)
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut table = self.table.borrow_mut();
		for name in names {
			let name = name.as_ref();
			let definition = match self.overrides.get(name) {
				Some(specific) => specific.merged_over(&self.default),
				None => self.default.clone(),
			};
			table.insert(name.to_owned(), definition);
		}
	}

	fn definition(&self, name: &str) -> Option<Override> {
		self.table.borrow().get(name).cloned()
	}

	fn trampoline(&self, name: &str) -> Callback {
		let this = self.this.clone();
		let name = name.to_owned();
		Callback::new(move |args| match this.upgrade() {
			Some(proxy) => proxy.call(&name, args),
			None => Err(HostError::NoSuchMethod { kind: ObjectKind::Other, name: name.clone() }),
		})
	}
}
impl Debug for Proxy {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Proxy").field(&self.target).finish()
	}
}
impl HostObject for Proxy {
	fn identity(&self) -> ObjectId {
		self.target.identity()
	}

	fn kind(&self) -> ObjectKind {
		self.target.kind()
	}

	fn get(&self, name: &str) -> Value {
		let definition = match self.definition(name) {
			Some(definition) => definition,
			None => return self.target.get(name),
		};
		if let Some(get) = definition.get {
			return get(&self.target, name);
		}
		let value = self.target.get(name);
		if value.is_callable() {
			return Value::Function(self.trampoline(name));
		}
		match definition.wrap {
			Some(wrap) if !value.is_nullish() => wrap(value),
			_ => value,
		}
	}

	fn has(&self, name: &str) -> bool {
		self.extensions.contains_key(name) || self.is_intercepted(name) || self.target.has(name)
	}

	fn set(&self, name: &str, value: Value) -> Result<(), HostError> {
		match self.definition(name).and_then(|definition| definition.set) {
			Some(set) => set(&self.target, name, value),
			None => self.target.set(name, unwrap(&value)),
		}
	}

	fn delete(&self, name: &str) -> bool {
		self.target.delete(name)
	}

	fn call(&self, name: &str, args: &[Value]) -> Result<Value, HostError> {
		match self.definition(name).and_then(|definition| definition.invoke) {
			Some(invoke) => invoke(&self.target, name, args),
			None => self.target.call(name, &unwrap_args(args)),
		}
	}

	fn own_keys(&self) -> Vec<String> {
		let mut seen = HashSet::new();
		let mut keys = self.target.own_keys();
		keys.retain(|key| seen.insert(key.clone()));
		let mut extra = self.table.borrow().keys().filter(|key| !seen.contains(*key)).cloned().collect::<Vec<_>>();
		extra.sort();
		keys.extend(extra);
		keys
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

#[cfg(test)]
mod tests {
	use super::{as_proxy, unwrap, wrap, Override, Policy};
	use crate::{
		host::{HostExt, HostObject, HostRef, Value},
		memory::Node,
	};
	use core::cell::RefCell;
	use std::rc::Rc;

	#[test]
	fn wrapping_is_idempotent() {
		let document = Node::new_document();
		let div: HostRef = document.create_element("div");

		let first = wrap(div.clone(), Policy::new());
		let second = wrap(div.clone(), Policy::new());
		assert!(Rc::ptr_eq(&first, &second));

		let rewrapped = wrap(first.clone(), Policy::new());
		assert!(Rc::ptr_eq(&first, &rewrapped));
	}

	#[test]
	fn forwards_unintercepted_access() {
		let document = Node::new_document();
		let div = document.create_element("div");
		let proxy: HostRef = wrap(div.clone(), Policy::new());

		proxy.call("setAttribute", &["title".into(), "hello".into()]).unwrap();
		assert_eq!(div.get_attribute("title").as_deref(), Some("hello"));
		assert_eq!(proxy.get_attribute("title").unwrap().as_deref(), Some("hello"));
		assert!(proxy.is_element());
		assert_eq!(proxy.identity(), div.identity());
	}

	#[test]
	fn specific_override_beats_default() {
		let document = Node::new_document();
		let div = document.create_element("div");
		let log = Rc::new(RefCell::new(Vec::new()));

		let policy = Policy::new()
			.with_default(Override::new().on_invoke({
				let log = log.clone();
				move |target, name, args| {
					log.borrow_mut().push(format!("default {}", name));
					target.call(name, args)
				}
			}))
			.with(
				"setAttribute",
				Override::new().on_invoke({
					let log = log.clone();
					move |_, name, _| {
						log.borrow_mut().push(format!("specific {}", name));
						Ok(Value::Undefined)
					}
				}),
			);
		let proxy = wrap(div.clone(), policy);

		proxy.call("setAttribute", &["title".into(), "x".into()]).unwrap();
		proxy.call("hasAttribute", &["title".into()]).unwrap();
		assert_eq!(*log.borrow(), ["specific setAttribute", "default hasAttribute"]);
		assert_eq!(div.get_attribute("title"), None);
	}

	#[test]
	fn late_properties_need_update() {
		let document = Node::new_document();
		let div = document.create_element("div");
		let sets = Rc::new(RefCell::new(0));
		let proxy = wrap(
			div.clone(),
			Policy::new().with_default(Override::new().on_set({
				let sets = sets.clone();
				move |target, name, value| {
					*sets.borrow_mut() += 1;
					target.set(name, value)
				}
			})),
		);

		div.set("_internal", Value::Number(1.0)).unwrap();
		assert!(!proxy.is_intercepted("_internal"));
		proxy.set("_internal", Value::Number(2.0)).unwrap();
		assert_eq!(*sets.borrow(), 0);

		proxy.update(["_internal"]);
		proxy.set("_internal", Value::Number(3.0)).unwrap();
		assert_eq!(*sets.borrow(), 1);
		assert_eq!(div.get("_internal"), Value::Number(3.0));
	}

	#[test]
	fn methods_read_as_trampolines() {
		let document = Node::new_document();
		let div = document.create_element("div");
		let calls = Rc::new(RefCell::new(0));
		let proxy = wrap(
			div.clone(),
			Policy::new().with(
				"setAttribute",
				Override::new().on_invoke({
					let calls = calls.clone();
					move |target, name, args| {
						*calls.borrow_mut() += 1;
						target.call(name, args)
					}
				}),
			),
		);

		let set_attribute = proxy.get("setAttribute");
		let set_attribute = set_attribute.as_callback().unwrap();
		set_attribute.call(&["lang".into(), "en".into()]).unwrap();
		assert_eq!(*calls.borrow(), 1);
		assert_eq!(div.get_attribute("lang").as_deref(), Some("en"));
	}

	#[test]
	fn unwrap_strips_one_layer() {
		let document = Node::new_document();
		let div: HostRef = document.create_element("div");
		let proxy: HostRef = wrap(div.clone(), Policy::new().extend("marker", Rc::new(5_u8)));

		let value = Value::Object(proxy.clone());
		assert!(as_proxy(&value).is_some());
		assert_eq!(as_proxy(&value).unwrap().extension::<u8>("marker").as_deref(), Some(&5));
		let unwrapped = unwrap(&value);
		assert!(as_proxy(&unwrapped).is_none());
		assert_eq!(unwrapped, Value::Object(div));
	}
}

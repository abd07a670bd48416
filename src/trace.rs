//! Access logging for debugging renderer integrations.
//!
//! A [`Traced`] object logs each access by a path-like name (`domRoot.ownerDocument`, `[domRoot.ownerDocument.createElement()]`, …)
//! and traces the objects and functions it hands out in turn.
//! Assignments and calls are logged at `DEBUG`, reads at `TRACE`.

use crate::host::{Callback, HostError, HostObject, HostRef, ObjectId, ObjectKind, Value};
use core::{
	any::Any,
	fmt::{self, Debug, Formatter},
};
use std::rc::Rc;
use tracing::{debug, trace};

pub struct Traced {
	inner: HostRef,
	name: String,
}
impl Traced {
	pub fn new(inner: HostRef, name: impl Into<String>) -> Self {
		Self { inner, name: name.into() }
	}

	#[must_use]
	pub fn inner(&self) -> &HostRef {
		&self.inner
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}
}
impl Debug for Traced {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Traced").field(&self.name).field(&self.inner).finish()
	}
}

/// Strips any number of [`Traced`] layers.
#[must_use]
pub fn untrace(value: &Value) -> Value {
	let mut value = value.clone();
	while let Some(inner) = value.as_object().and_then(|object| object.as_any().downcast_ref::<Traced>()).map(|traced| traced.inner.clone()) {
		value = Value::Object(inner);
	}
	value
}

fn untrace_args(args: &[Value]) -> Vec<Value> {
	args.iter().map(untrace).collect()
}

fn traced(value: Value, name: String) -> Value {
	match value {
		Value::Object(object) if object.as_any().downcast_ref::<Traced>().is_none() => Value::Object(Rc::new(Traced::new(object, name))),
		Value::Function(callback) => Value::Function(Callback::new(move |args| {
			debug!(?args, "[CALL] {}()", name);
			let result = callback.call(&untrace_args(args))?;
			Ok(traced(result, format!("[{}()]", name)))
		})),
		other => other,
	}
}

impl HostObject for Traced {
	fn identity(&self) -> ObjectId {
		self.inner.identity()
	}

	fn kind(&self) -> ObjectKind {
		self.inner.kind()
	}

	fn get(&self, name: &str) -> Value {
		let value = self.inner.get(name);
		trace!(?value, "[GET ] {}.{}", self.name, name);
		traced(value, format!("{}.{}", self.name, name))
	}

	fn has(&self, name: &str) -> bool {
		self.inner.has(name)
	}

	fn set(&self, name: &str, value: Value) -> Result<(), HostError> {
		debug!(?value, "[SET ] {}.{}", self.name, name);
		self.inner.set(name, untrace(&value))
	}

	fn delete(&self, name: &str) -> bool {
		debug!("[DEL ] {}.{}", self.name, name);
		self.inner.delete(name)
	}

	fn call(&self, name: &str, args: &[Value]) -> Result<Value, HostError> {
		debug!(?args, "[CALL] {}.{}()", self.name, name);
		let result = self.inner.call(name, &untrace_args(args))?;
		Ok(traced(result, format!("[{}.{}()]", self.name, name)))
	}

	fn own_keys(&self) -> Vec<String> {
		self.inner.own_keys()
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

#[cfg(test)]
mod tests {
	use super::{untrace, Traced};
	use crate::{
		host::{HostExt, HostObject, HostRef, Value},
		memory::Node,
	};
	use std::rc::Rc;

	#[test]
	fn traces_transitively_and_untraces_arguments() {
		let document = Node::new_document();
		let body: HostRef = document.body().unwrap();
		let traced: HostRef = Rc::new(Traced::new(body.clone(), "domRoot"));

		let owner = traced.get("ownerDocument");
		let owner = owner.as_object().unwrap();
		assert_eq!(owner.as_any().downcast_ref::<Traced>().unwrap().name(), "domRoot.ownerDocument");

		let created = owner.call("createElement", &["p".into()]).unwrap();
		assert_eq!(created.as_object().unwrap().as_any().downcast_ref::<Traced>().unwrap().name(), "[domRoot.ownerDocument.createElement()]");

		// The body only accepts memory nodes, so this fails unless the argument is untraced.
		traced.call("appendChild", &[created.clone()]).unwrap();
		assert_eq!(document.body().unwrap().inner_html(), "<p></p>");
		assert!(untrace(&created).as_object().unwrap().as_any().downcast_ref::<Traced>().is_none());
		assert!(traced.same(&body));
	}

	#[test]
	fn traces_callbacks() {
		let document = Node::new_document();
		let traced: HostRef = Rc::new(Traced::new(document.create_element("div"), "div"));
		let set_attribute = traced.get("setAttribute");
		set_attribute.as_callback().unwrap().call(&["title".into(), "x".into()]).unwrap();
		assert_eq!(traced.get("title"), Value::from("x"));
	}
}

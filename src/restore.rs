//! Reversible mutation logs.
//!
//! A [`Restorable`] records, before a host object is first mutated in some respect, how to undo that mutation.
//! [`Restorable::restore`] then replays the recorded undo actions **in the order they were recorded**.

use crate::{
	host::{optional_string_arg, string_arg, to_kebab_case, HostError, HostExt, HostRef, Value},
	once::Once,
};
use core::{
	cell::RefCell,
	fmt::{self, Debug, Formatter},
	mem,
};
use std::rc::Rc;
use tracing::{trace, warn};

#[derive(Default)]
pub struct Restorable {
	memo: Once<String, ()>,
	undo: RefCell<Vec<Box<dyn FnOnce()>>>,
	subs: Once<String, Rc<Restorable>>,
}
impl Restorable {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Runs `record` only the first time `key` is seen (since the last [`restore`](`Restorable::restore`)).
	/// Returns whether it ran.
	pub fn once(&self, key: &str, record: impl FnOnce()) -> bool {
		let mut ran = false;
		self.memo.once(key.to_owned(), || {
			record();
			ran = true;
		});
		ran
	}

	/// The nested scope `name`, which is restored as part of this one.
	pub fn sub(&self, name: &str) -> Rc<Restorable> {
		self.subs.once(name.to_owned(), || {
			let sub = Rc::new(Restorable::new());
			let undo = sub.clone();
			self.push_undo(move || undo.restore());
			sub
		})
	}

	pub fn push_undo(&self, undo: impl FnOnce() + 'static) {
		self.undo.borrow_mut().push(Box::new(undo));
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.undo.borrow().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Replays and discards every recorded undo action, then forgets which keys were seen.
	pub fn restore(&self) {
		let undo = mem::take(&mut *self.undo.borrow_mut());
		trace!(count = undo.len(), "Restoring.");
		for action in undo {
			action();
		}
		self.memo.clear();
		self.subs.clear();
	}

	/// Assigns `object[name] = value`, remembering the original value (or its absence) the first time `name` is assigned.
	///
	/// # Errors
	///
	/// Iff the assignment itself fails.
	pub fn set(&self, object: &HostRef, name: &str, value: Value) -> Result<(), HostError> {
		self.once(&format!("prop:{}", name), || {
			let object = object.clone();
			let name = name.to_owned();
			if object.has(&name) {
				let old = object.get(&name);
				self.push_undo(move || {
					if let Err(error) = object.set(&name, old) {
						warn!(property = %name, %error, "Failed to reset property.");
					}
				});
			} else {
				self.push_undo(move || {
					object.delete(&name);
				});
			}
		});
		object.set(name, value)
	}

	/// Calls `target.name(args)` after recording how to undo it, if that is known.
	///
	/// # Errors
	///
	/// Iff the arguments are malformed for a tracked method, or the call itself fails.
	pub fn invoke_node(&self, target: &HostRef, name: &str, args: &[Value]) -> Result<Value, HostError> {
		match name {
			"setAttribute" => {
				let attribute = string_arg(name, args, 0)?;
				self.once(&format!("attr:{}", attribute), || match target.get_attribute(attribute) {
					Ok(Some(old)) => self.push_undo(undo_call(target, "setAttribute", vec![attribute.into(), old.into()])),
					Ok(None) => self.push_undo(undo_call(target, "removeAttribute", vec![attribute.into()])),
					Err(error) => warn!(%attribute, %error, "Could not read original attribute value."),
				});
			}
			"setAttributeNS" => {
				let namespace = optional_string_arg(name, args, 0)?;
				let qualified = string_arg(name, args, 1)?;
				let local = qualified.rsplit(':').next().unwrap_or(qualified);
				self.once(&format!("attr:{}:{}", namespace.unwrap_or_default(), local), || {
					match target.call("getAttributeNS", &[namespace.into(), local.into()]) {
						Ok(Value::String(old)) => self.push_undo(undo_call(target, "setAttributeNS", vec![namespace.into(), qualified.into(), old.into()])),
						Ok(_) => self.push_undo(undo_call(target, "removeAttributeNS", vec![namespace.into(), local.into()])),
						Err(error) => warn!(attribute = %qualified, %error, "Could not read original attribute value."),
					}
				});
			}
			"removeAttribute" => {
				let attribute = string_arg(name, args, 0)?;
				self.once(&format!("attr:{}", attribute), || match target.get_attribute(attribute) {
					Ok(Some(old)) => self.push_undo(undo_call(target, "setAttribute", vec![attribute.into(), old.into()])),
					Ok(None) => (),
					Err(error) => warn!(%attribute, %error, "Could not read original attribute value."),
				});
			}
			"removeAttributeNS" => {
				let namespace = optional_string_arg(name, args, 0)?;
				let local = string_arg(name, args, 1)?;
				self.once(&format!("attr:{}:{}", namespace.unwrap_or_default(), local), || {
					match target.call("getAttributeNS", &[namespace.into(), local.into()]) {
						Ok(Value::String(old)) => self.push_undo(undo_call(target, "setAttributeNS", vec![namespace.into(), local.into(), old.into()])),
						Ok(_) => (),
						Err(error) => warn!(attribute = %local, %error, "Could not read original attribute value."),
					}
				});
			}
			"addEventListener" => self.push_undo(undo_call(target, "removeEventListener", args.iter().take(3).cloned().collect())),
			"attachEvent" => self.push_undo(undo_call(target, "detachEvent", args.iter().take(2).cloned().collect())),
			// Undoing the matching registration afterwards is a no-op.
			"removeEventListener" | "detachEvent" => (),
			_ if is_read_only(name) => (),
			_ => warn!(method = name, tag = ?target.tag_name(), "Cannot undo operation."),
		}
		target.call(name, args)
	}

	/// Calls `style.name(args)` after recording how to undo it, for the methods of a [***CSSStyleDeclaration***](https://developer.mozilla.org/en-US/docs/Web/API/CSSStyleDeclaration).
	///
	/// # Errors
	///
	/// Iff the arguments are malformed for a tracked method, or the call itself fails.
	pub fn invoke_style(&self, style: &HostRef, name: &str, args: &[Value]) -> Result<Value, HostError> {
		match name {
			"setProperty" | "removeProperty" => self.record_style(style, &to_kebab_case(string_arg(name, args, 0)?)),
			_ if is_read_only(name) => (),
			_ => warn!(method = name, "Cannot undo style operation."),
		}
		style.call(name, args)
	}

	/// Assigns `style[name] = value`, a property of a [***CSSStyleDeclaration***](https://developer.mozilla.org/en-US/docs/Web/API/CSSStyleDeclaration).
	///
	/// Property assignments share their undo record with [`invoke_style`](`Restorable::invoke_style`) calls on the same CSS property,
	/// and are undone including the original priority.
	///
	/// # Errors
	///
	/// Iff the assignment itself fails.
	pub fn set_style(&self, style: &HostRef, name: &str, value: Value) -> Result<(), HostError> {
		if name == "cssText" {
			return self.set(style, name, value);
		}
		self.record_style(style, &to_kebab_case(name));
		style.set(name, value)
	}

	fn record_style(&self, style: &HostRef, property: &str) {
		self.once(&format!("style:{}", property), || {
			let value = style.call("getPropertyValue", &[property.into()]);
			let priority = style.call("getPropertyPriority", &[property.into()]);
			match (value, priority) {
				(Ok(value), Ok(priority)) => self.push_undo(undo_call(style, "setProperty", vec![property.into(), value, priority])),
				(Err(error), _) | (_, Err(error)) => warn!(%property, %error, "Could not read original style property."),
			}
		});
	}
}
impl Debug for Restorable {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Restorable").field("undo", &self.len()).finish_non_exhaustive()
	}
}

fn undo_call(target: &HostRef, method: &'static str, args: Vec<Value>) -> impl FnOnce() {
	let target = target.clone();
	move || {
		if let Err(error) = target.call(method, &args) {
			warn!(method, %error, "Undo failed.");
		}
	}
}

/// Whether `method` is a getter, predicate or query, which needs no undo.
#[must_use]
pub fn is_read_only(method: &str) -> bool {
	["get", "has", "query", "is"].iter().any(|prefix| method.starts_with(prefix))
		|| matches!(method, "contains" | "matches" | "closest" | "compareDocumentPosition" | "item")
}

//! Conveniences for renderers that want to spell out where their content goes.

use crate::{
	blend::{vnode_of, RESERVED_PREFIX, SELECTOR_KEY},
	host::{HostError, HostRef, Value},
};

/// An element that must merge onto whatever `selector` matches, and is never inserted on its own.
///
/// ```
/// use dom_blend::{component::Attach, memory::Node, host::{HostExt, HostRef}};
///
/// let document: HostRef = Node::new_document();
/// let element = Attach::new("#signup").tag("form").attribute("class", "wide").create(&document).unwrap();
/// assert_eq!(element.tag_name().as_deref(), Some("form"));
/// assert_eq!(element.get_attribute("data-blend-selector").unwrap().as_deref(), Some("#signup"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attach {
	selector: String,
	tag: String,
	attributes: Vec<(String, String)>,
}
impl Attach {
	#[must_use]
	pub fn new(selector: impl Into<String>) -> Self {
		Self {
			selector: selector.into(),
			tag: "div".to_owned(),
			attributes: Vec::new(),
		}
	}

	#[must_use]
	pub fn tag(mut self, tag: impl Into<String>) -> Self {
		self.tag = tag.into();
		self
	}

	#[must_use]
	pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.attributes.push((name.into(), value.into()));
		self
	}

	/// Creates the element through `document`, which should be the blended document of a render root.
	///
	/// # Errors
	///
	/// Iff any of the host calls fails.
	pub fn create(&self, document: &HostRef) -> Result<HostRef, HostError> {
		let element = document
			.call("createElement", &[self.tag.as_str().into()])?
			.into_object()
			.ok_or_else(|| HostError::UnexpectedReturn {
				method: "createElement".to_owned(),
				expected: "an element",
			})?;
		let reserved = format!("{}{}", RESERVED_PREFIX, SELECTOR_KEY);
		element.call("setAttribute", &[reserved.into(), self.selector.as_str().into()])?;
		for (name, value) in &self.attributes {
			element.call("setAttribute", &[name.as_str().into(), value.as_str().into()])?;
		}
		Ok(element)
	}
}

/// Hands the host node `element` ends up mirrored onto to `f`, as soon as that is known.
///
/// Returns `false` (without calling `f`) iff `element` is not a blended node.
pub fn on_resolved(element: &Value, f: impl FnOnce(&HostRef) + 'static) -> bool {
	match vnode_of(element) {
		Some(vnode) => {
			vnode.dispatch(f);
			true
		}
		None => false,
	}
}

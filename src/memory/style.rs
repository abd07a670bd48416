use crate::host::{string_arg, to_kebab_case, Callback, HostError, HostObject, ObjectId, ObjectKind, Value};
use core::{
	any::Any,
	cell::RefCell,
	fmt::{self, Debug, Formatter},
};
use std::rc::{Rc, Weak};

const METHODS: &[&str] = &["setProperty", "removeProperty", "getPropertyValue", "getPropertyPriority", "item"];

/// Enumerated in addition to whatever is currently declared, so that wrappers built from [`HostObject::own_keys`] intercept them.
const COMMON_PROPERTIES: &[&str] = &[
	"alignItems",
	"background",
	"backgroundColor",
	"border",
	"borderColor",
	"borderRadius",
	"bottom",
	"boxShadow",
	"color",
	"cursor",
	"display",
	"flex",
	"flexDirection",
	"float",
	"font",
	"fontFamily",
	"fontSize",
	"fontStyle",
	"fontWeight",
	"gap",
	"height",
	"justifyContent",
	"left",
	"lineHeight",
	"margin",
	"marginBottom",
	"marginLeft",
	"marginRight",
	"marginTop",
	"maxWidth",
	"minWidth",
	"opacity",
	"outline",
	"overflow",
	"padding",
	"position",
	"right",
	"textAlign",
	"textDecoration",
	"top",
	"transform",
	"visibility",
	"width",
	"zIndex",
];

#[derive(Debug, Clone)]
struct Declaration {
	property: String,
	value: String,
	important: bool,
}

/// An inline [***CSSStyleDeclaration***](https://developer.mozilla.org/en-US/docs/Web/API/CSSStyleDeclaration).
///
/// Property names are stored in their hyphenated CSS form. The camel-cased forms are accepted as dynamic properties.
pub struct Style {
	id: ObjectId,
	this: Weak<Style>,
	declarations: RefCell<Vec<Declaration>>,
}
impl Style {
	pub(super) fn new() -> Rc<Self> {
		Rc::new_cyclic(|this| Self {
			id: ObjectId::next(),
			this: this.clone(),
			declarations: RefCell::default(),
		})
	}

	/// Setting an empty value removes the property.
	pub fn set_property(&self, property: &str, value: &str, priority: &str) {
		let property = normalize(property);
		let value = value.trim();
		if value.is_empty() {
			self.remove_property(&property);
			return;
		}
		let important = priority.eq_ignore_ascii_case("important");
		let mut declarations = self.declarations.borrow_mut();
		match declarations.iter_mut().find(|declaration| declaration.property == property) {
			Some(declaration) => {
				declaration.value = value.to_owned();
				declaration.important = important;
			}
			None => declarations.push(Declaration {
				property,
				value: value.to_owned(),
				important,
			}),
		}
	}

	/// Returns the previous value.
	pub fn remove_property(&self, property: &str) -> String {
		let property = normalize(property);
		let mut declarations = self.declarations.borrow_mut();
		match declarations.iter().position(|declaration| declaration.property == property) {
			Some(index) => declarations.remove(index).value,
			None => String::new(),
		}
	}

	#[must_use]
	pub fn get_property_value(&self, property: &str) -> String {
		let property = normalize(property);
		self.declarations
			.borrow()
			.iter()
			.find(|declaration| declaration.property == property)
			.map(|declaration| declaration.value.clone())
			.unwrap_or_default()
	}

	#[must_use]
	pub fn get_property_priority(&self, property: &str) -> String {
		let property = normalize(property);
		let important = self.declarations.borrow().iter().any(|declaration| declaration.property == property && declaration.important);
		let priority = if important { "important" } else { "" };
		priority.to_owned()
	}

	#[must_use]
	pub fn css_text(&self) -> String {
		self.declarations
			.borrow()
			.iter()
			.map(|declaration| {
				format!(
					"{}: {}{};",
					declaration.property,
					declaration.value,
					if declaration.important { " !important" } else { "" }
				)
			})
			.collect::<Vec<_>>()
			.join(" ")
	}

	/// Replaces all declarations. Malformed ones are skipped.
	pub fn set_css_text(&self, text: &str) {
		self.declarations.borrow_mut().clear();
		for declaration in text.split(';') {
			if let Some((property, value)) = declaration.split_once(':') {
				let (value, priority) = match value.trim().strip_suffix("!important") {
					Some(value) => (value, "important"),
					None => (value, ""),
				};
				self.set_property(property.trim(), value, priority);
			}
		}
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.declarations.borrow().len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn method(&self, name: &str) -> Callback {
		let this = self.this.clone();
		let name = name.to_owned();
		Callback::new(move |args| match this.upgrade() {
			Some(style) => style.call(&name, args),
			None => Err(HostError::NoSuchMethod { kind: ObjectKind::Style, name: name.clone() }),
		})
	}
}
impl Debug for Style {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "Style#{}({} declarations)", self.id.get(), self.len())
	}
}

fn normalize(property: &str) -> String {
	if property.starts_with("--") {
		property.to_owned()
	} else {
		property.trim().to_ascii_lowercase()
	}
}

fn is_css_name(name: &str) -> bool {
	name.starts_with("--")
		|| (name.starts_with(|c: char| c.is_ascii_lowercase()) && name.chars().all(|c| c.is_ascii_alphabetic() || c == '-'))
}

fn display(value: &Value) -> String {
	if value.is_nullish() {
		String::new()
	} else {
		value.to_display_string()
	}
}

impl HostObject for Style {
	fn identity(&self) -> ObjectId {
		self.id
	}

	fn kind(&self) -> ObjectKind {
		ObjectKind::Style
	}

	fn get(&self, name: &str) -> Value {
		match name {
			_ if METHODS.contains(&name) => Value::Function(self.method(name)),
			#[allow(clippy::cast_precision_loss)]
			"length" => Value::Number(self.len() as f64),
			"cssText" => Value::String(self.css_text()),
			_ if is_css_name(name) => Value::String(self.get_property_value(&to_kebab_case(name))),
			_ => Value::Undefined,
		}
	}

	fn has(&self, name: &str) -> bool {
		METHODS.contains(&name) || matches!(name, "length" | "cssText") || is_css_name(name)
	}

	fn set(&self, name: &str, value: Value) -> Result<(), HostError> {
		match name {
			"cssText" => self.set_css_text(&display(&value)),
			_ if is_css_name(name) && name != "length" => self.set_property(&to_kebab_case(name), &display(&value), ""),
			_ => return Err(HostError::ReadOnly(name.to_owned())),
		}
		Ok(())
	}

	fn delete(&self, name: &str) -> bool {
		is_css_name(name) && !self.remove_property(&to_kebab_case(name)).is_empty()
	}

	fn call(&self, name: &str, args: &[Value]) -> Result<Value, HostError> {
		let optional = |index: usize| args.get(index).map(display).unwrap_or_default();
		Ok(match name {
			"setProperty" => {
				self.set_property(string_arg(name, args, 0)?, &optional(1), &optional(2));
				Value::Undefined
			}
			"removeProperty" => Value::String(self.remove_property(string_arg(name, args, 0)?)),
			"getPropertyValue" => Value::String(self.get_property_value(string_arg(name, args, 0)?)),
			"getPropertyPriority" => Value::String(self.get_property_priority(string_arg(name, args, 0)?)),
			"item" => {
				#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
				let index = args.first().and_then(Value::as_f64).unwrap_or(0.0) as usize;
				Value::String(
					self.declarations
						.borrow()
						.get(index)
						.map(|declaration| declaration.property.clone())
						.unwrap_or_default(),
				)
			}
			_ => return Err(HostError::NoSuchMethod { kind: ObjectKind::Style, name: name.to_owned() }),
		})
	}

	fn own_keys(&self) -> Vec<String> {
		let mut keys = METHODS.iter().chain(&["length", "cssText"]).chain(COMMON_PROPERTIES).map(|&key| key.to_owned()).collect::<Vec<_>>();
		for declaration in self.declarations.borrow().iter() {
			let camel = to_camel_case(&declaration.property);
			if !keys.contains(&camel) {
				keys.push(camel);
			}
		}
		keys
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

fn to_camel_case(property: &str) -> String {
	if property.starts_with("--") {
		return property.to_owned();
	}
	let mut camel = String::with_capacity(property.len());
	let mut upper = false;
	for c in property.chars() {
		if c == '-' {
			upper = !camel.is_empty();
		} else if upper {
			camel.push(c.to_ascii_uppercase());
			upper = false;
		} else {
			camel.push(c);
		}
	}
	camel
}

#[cfg(test)]
mod tests {
	use super::{to_camel_case, to_kebab_case, Style};
	use crate::host::{HostObject, Value};

	#[test]
	fn case_conversion() {
		assert_eq!(to_kebab_case("backgroundColor"), "background-color");
		assert_eq!(to_kebab_case("color"), "color");
		assert_eq!(to_kebab_case("--accent"), "--accent");
		assert_eq!(to_camel_case("font-weight"), "fontWeight");
	}

	#[test]
	fn declarations() {
		let style = Style::new();
		style.set("backgroundColor", "red".into()).unwrap();
		style.call("setProperty", &["color".into(), "green".into(), "important".into()]).unwrap();
		assert_eq!(style.css_text(), "background-color: red; color: green !important;");
		assert_eq!(style.get("color"), Value::from("green"));
		assert!(style.has("borderLeftWidth"));
		assert!(style.own_keys().contains(&"backgroundColor".to_owned()));

		style.set("color", Value::Null).unwrap();
		assert_eq!(style.get_property_priority("color"), "");
		assert_eq!(style.len(), 1);

		style.set_css_text("margin: 0 !important; garbage; padding:1px");
		assert_eq!(style.get_property_value("padding"), "1px");
		assert_eq!(style.get_property_priority("margin"), "important");
		assert!(style.get_property_value("background-color").is_empty());
	}
}

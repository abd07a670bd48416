//! An in-memory DOM, for native use and tests.
//!
//! [`Node`] offers a typed Rust API as well as the dynamic [`HostObject`] bridge, which exposes the usual DOM property and method names.
//! Node arguments passed through the bridge must be plain memory nodes, so any wrapper that leaks through is reported as [`HostError::InvalidArgument`].

mod selector;
mod style;

pub use selector::SelectorList;
pub use style::Style;

use crate::host::{optional_string_arg, string_arg, Callback, HostError, HostObject, ObjectId, ObjectKind, Value};
use core::{
	any::Any,
	cell::{OnceCell, RefCell},
	fmt::{self, Debug, Formatter},
};
use hashbrown::HashMap;
use std::rc::{Rc, Weak};
use tracing::warn;

const XHTML: &str = "http://www.w3.org/1999/xhtml";

const NODE_METHODS: &[&str] = &[
	"appendChild",
	"insertBefore",
	"removeChild",
	"contains",
	"addEventListener",
	"removeEventListener",
	"dispatchEvent",
];
const QUERY_METHODS: &[&str] = &["querySelector", "querySelectorAll"];
const ELEMENT_METHODS: &[&str] = &[
	"getAttribute",
	"setAttribute",
	"hasAttribute",
	"removeAttribute",
	"getAttributeNS",
	"setAttributeNS",
	"hasAttributeNS",
	"removeAttributeNS",
	"matches",
];
const DOCUMENT_METHODS: &[&str] = &["createElement", "createElementNS", "createTextNode", "createComment", "getElementById"];

const NODE_PROPERTIES: &[&str] = &[
	"nodeType",
	"nodeName",
	"parentNode",
	"childNodes",
	"firstChild",
	"lastChild",
	"isConnected",
	"ownerDocument",
	"textContent",
];
const ELEMENT_PROPERTIES: &[&str] = &[
	"tagName",
	"style",
	"id",
	"className",
	"name",
	"type",
	"htmlFor",
	"title",
	"lang",
	"placeholder",
	"href",
	"src",
	"value",
	"checked",
];
const CHARACTER_DATA_PROPERTIES: &[&str] = &["data", "nodeValue", "length"];
const DOCUMENT_PROPERTIES: &[&str] = &["documentElement", "head", "body"];

const READ_ONLY: &[&str] = &[
	"nodeType",
	"nodeName",
	"parentNode",
	"childNodes",
	"firstChild",
	"lastChild",
	"isConnected",
	"ownerDocument",
	"tagName",
	"style",
	"length",
	"documentElement",
	"head",
	"body",
];

const VOID_ELEMENTS: &[&str] = &["area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr"];

/// Element properties that reflect a content attribute.
fn reflected(property: &str) -> Option<&'static str> {
	Some(match property {
		"id" => "id",
		"className" => "class",
		"name" => "name",
		"type" => "type",
		"htmlFor" => "for",
		"title" => "title",
		"lang" => "lang",
		"placeholder" => "placeholder",
		"href" => "href",
		"src" => "src",
		_ => return None,
	})
}

enum NodeData {
	Document,
	Element { name: String, namespace: Option<String> },
	Text,
	Comment,
}

struct Attribute {
	namespace: Option<String>,
	/// Qualified.
	name: String,
	value: String,
}
impl Attribute {
	fn local_name(&self) -> &str {
		local_part(&self.name)
	}
}

fn local_part(qualified: &str) -> &str {
	qualified.rsplit(':').next().unwrap_or(qualified)
}

struct Listener {
	kind: String,
	callback: Callback,
	capture: bool,
}

pub struct Node {
	id: ObjectId,
	this: Weak<Node>,
	document: Weak<Node>,
	data: NodeData,
	parent: RefCell<Weak<Node>>,
	children: RefCell<Vec<Rc<Node>>>,
	attributes: RefCell<Vec<Attribute>>,
	text: RefCell<String>,
	style: OnceCell<Rc<Style>>,
	listeners: RefCell<Vec<Listener>>,
	properties: RefCell<HashMap<String, Value>>,
}

/// Construction and tree structure.
impl Node {
	fn new(document: &Weak<Node>, data: NodeData, text: String) -> Rc<Self> {
		Rc::new_cyclic(|this| Self {
			id: ObjectId::next(),
			this: this.clone(),
			document: match data {
				NodeData::Document => this.clone(),
				_ => document.clone(),
			},
			data,
			parent: RefCell::default(),
			children: RefCell::default(),
			attributes: RefCell::default(),
			text: RefCell::new(text),
			style: OnceCell::new(),
			listeners: RefCell::default(),
			properties: RefCell::default(),
		})
	}

	/// Creates a document containing `<html><head></head><body></body></html>`.
	#[must_use]
	pub fn new_document() -> Rc<Self> {
		let document = Self::new(&Weak::new(), NodeData::Document, String::new());
		let html = document.create_element("html");
		html.adopt(document.create_element("head"), None);
		html.adopt(document.create_element("body"), None);
		document.adopt(html, None);
		document
	}

	fn owning_document(&self) -> Option<Rc<Node>> {
		self.document.upgrade()
	}

	/// [`None`] for documents.
	#[must_use]
	pub fn owner_document(&self) -> Option<Rc<Node>> {
		match self.data {
			NodeData::Document => None,
			_ => self.owning_document(),
		}
	}

	#[must_use]
	pub fn document_element(&self) -> Option<Rc<Node>> {
		let document = self.owning_document()?;
		let element = document.children.borrow().iter().find(|child| child.is_element()).cloned();
		element
	}

	#[must_use]
	pub fn head(&self) -> Option<Rc<Node>> {
		self.html_child("head")
	}

	#[must_use]
	pub fn body(&self) -> Option<Rc<Node>> {
		self.html_child("body")
	}

	fn html_child(&self, name: &str) -> Option<Rc<Node>> {
		let html = self.document_element()?;
		let child = html.children.borrow().iter().find(|child| child.local_name() == Some(name)).cloned();
		child
	}

	/// Creates an element in the HTML namespace. `tag` is lowercased.
	#[must_use]
	pub fn create_element(&self, tag: &str) -> Rc<Node> {
		Self::new(
			&self.document,
			NodeData::Element {
				name: tag.to_ascii_lowercase(),
				namespace: None,
			},
			String::new(),
		)
	}

	#[must_use]
	pub fn create_element_ns(&self, namespace: Option<&str>, qualified_name: &str) -> Rc<Node> {
		let (name, namespace) = match namespace {
			None | Some(XHTML) => (qualified_name.to_ascii_lowercase(), None),
			Some(namespace) => (qualified_name.to_owned(), Some(namespace.to_owned())),
		};
		Self::new(&self.document, NodeData::Element { name, namespace }, String::new())
	}

	#[must_use]
	pub fn create_text_node(&self, text: &str) -> Rc<Node> {
		Self::new(&self.document, NodeData::Text, text.to_owned())
	}

	#[must_use]
	pub fn create_comment(&self, text: &str) -> Rc<Node> {
		Self::new(&self.document, NodeData::Comment, text.to_owned())
	}

	#[must_use]
	pub fn is_element(&self) -> bool {
		matches!(self.data, NodeData::Element { .. })
	}

	fn is_html(&self) -> bool {
		matches!(self.data, NodeData::Element { namespace: None, .. })
	}

	/// Lowercase for HTML elements, [`None`] for other nodes.
	#[must_use]
	pub fn local_name(&self) -> Option<&str> {
		match &self.data {
			NodeData::Element { name, .. } => Some(local_part(name)),
			_ => None,
		}
	}

	fn node_name(&self) -> String {
		match &self.data {
			NodeData::Document => "#document".to_owned(),
			NodeData::Element { name, namespace: None } => name.to_ascii_uppercase(),
			NodeData::Element { name, .. } => name.clone(),
			NodeData::Text => "#text".to_owned(),
			NodeData::Comment => "#comment".to_owned(),
		}
	}

	fn node_type(&self) -> f64 {
		match self.data {
			NodeData::Element { .. } => 1.0,
			NodeData::Text => 3.0,
			NodeData::Comment => 8.0,
			NodeData::Document => 9.0,
		}
	}

	#[must_use]
	pub fn parent(&self) -> Option<Rc<Node>> {
		self.parent.borrow().upgrade()
	}

	#[must_use]
	pub fn parent_element(&self) -> Option<Rc<Node>> {
		self.parent().filter(|parent| parent.is_element())
	}

	#[must_use]
	pub fn children(&self) -> Vec<Rc<Node>> {
		self.children.borrow().clone()
	}

	#[must_use]
	pub fn is_connected(&self) -> bool {
		let mut root = match self.this.upgrade() {
			Some(this) => this,
			None => return false,
		};
		while let Some(parent) = root.parent() {
			root = parent;
		}
		matches!(root.data, NodeData::Document)
	}

	/// Inclusive.
	#[must_use]
	pub fn contains(&self, other: &Node) -> bool {
		let mut current = other.this.upgrade();
		while let Some(node) = current {
			if core::ptr::eq(&*node, self) {
				return true;
			}
			current = node.parent();
		}
		false
	}

	/// # Errors
	///
	/// [`HostError::HierarchyRequest`] iff `self` can't have children or `child` is `self` or one of its ancestors.
	pub fn append_child(&self, child: &Rc<Node>) -> Result<(), HostError> {
		self.check_insertable(child)?;
		self.adopt(child.clone(), None);
		Ok(())
	}

	/// Inserts `child` before `reference`, or appends it if `reference` is [`None`].
	///
	/// # Errors
	///
	/// [`HostError::NotFound`] iff `reference` isn't a child of `self`.
	/// [`HostError::HierarchyRequest`] iff the insertion would produce an invalid tree.
	pub fn insert_before(&self, child: &Rc<Node>, reference: Option<&Rc<Node>>) -> Result<(), HostError> {
		self.check_insertable(child)?;
		let reference = match reference {
			None => None,
			Some(reference) if !self.is_parent_of(reference) => return Err(HostError::NotFound { operation: "insert before" }),
			Some(reference) if Rc::ptr_eq(reference, child) => self.next_sibling_of(child),
			Some(reference) => Some(reference.clone()),
		};
		self.adopt(child.clone(), reference.as_ref());
		Ok(())
	}

	/// # Errors
	///
	/// [`HostError::NotFound`] iff `child` isn't a child of `self`.
	pub fn remove_child(&self, child: &Rc<Node>) -> Result<(), HostError> {
		if !self.is_parent_of(child) {
			return Err(HostError::NotFound { operation: "remove" });
		}
		child.remove();
		Ok(())
	}

	/// Removes `self` from its parent, if any.
	pub fn remove(&self) {
		if let Some(parent) = self.parent() {
			parent.children.borrow_mut().retain(|sibling| !core::ptr::eq(&**sibling, self));
		}
		*self.parent.borrow_mut() = Weak::new();
	}

	fn is_parent_of(&self, child: &Node) -> bool {
		child.parent().map_or(false, |parent| core::ptr::eq(&*parent, self))
	}

	fn next_sibling_of(&self, child: &Rc<Node>) -> Option<Rc<Node>> {
		let children = self.children.borrow();
		let index = children.iter().position(|sibling| Rc::ptr_eq(sibling, child))?;
		children.get(index + 1).cloned()
	}

	fn check_insertable(&self, child: &Node) -> Result<(), HostError> {
		if matches!(self.data, NodeData::Text | NodeData::Comment) {
			return Err(HostError::HierarchyRequest("character data nodes can't have children".to_owned()));
		}
		if matches!(child.data, NodeData::Document) {
			return Err(HostError::HierarchyRequest("documents can't be inserted".to_owned()));
		}
		if child.contains(self) {
			return Err(HostError::HierarchyRequest("the new child contains the parent".to_owned()));
		}
		Ok(())
	}

	/// Unchecked insertion, moving `child` out of its current parent first.
	fn adopt(&self, child: Rc<Node>, reference: Option<&Rc<Node>>) {
		child.remove();
		*child.parent.borrow_mut() = self.this.clone();
		let mut children = self.children.borrow_mut();
		let index = reference
			.and_then(|reference| children.iter().position(|sibling| Rc::ptr_eq(sibling, reference)))
			.unwrap_or(children.len());
		children.insert(index, child);
	}
}

/// Attributes, text and listeners.
impl Node {
	fn normalize_attribute_name(&self, name: &str) -> String {
		if self.is_html() {
			name.to_ascii_lowercase()
		} else {
			name.to_owned()
		}
	}

	/// The `style` attribute is backed by [`Node::style`].
	pub fn set_attribute(&self, name: &str, value: &str) {
		let name = self.normalize_attribute_name(name);
		if name == "style" && self.is_element() {
			return self.style().set_css_text(value);
		}
		let mut attributes = self.attributes.borrow_mut();
		match attributes.iter_mut().find(|attribute| attribute.namespace.is_none() && attribute.name == name) {
			Some(attribute) => attribute.value = value.to_owned(),
			None => attributes.push(Attribute {
				namespace: None,
				name,
				value: value.to_owned(),
			}),
		}
	}

	#[must_use]
	pub fn get_attribute(&self, name: &str) -> Option<String> {
		let name = self.normalize_attribute_name(name);
		if name == "style" && self.is_element() {
			return self.style.get().filter(|style| !style.is_empty()).map(|style| style.css_text());
		}
		let attributes = self.attributes.borrow();
		attributes.iter().find(|attribute| attribute.name == name).map(|attribute| attribute.value.clone())
	}

	#[must_use]
	pub fn has_attribute(&self, name: &str) -> bool {
		self.get_attribute(name).is_some()
	}

	/// Returns whether the attribute was present.
	pub fn remove_attribute(&self, name: &str) -> bool {
		let name = self.normalize_attribute_name(name);
		if name == "style" && self.is_element() {
			let present = self.has_attribute("style");
			self.style().set_css_text("");
			return present;
		}
		let mut attributes = self.attributes.borrow_mut();
		let before = attributes.len();
		attributes.retain(|attribute| attribute.name != name);
		attributes.len() != before
	}

	pub fn set_attribute_ns(&self, namespace: Option<&str>, qualified_name: &str, value: &str) {
		let local = local_part(qualified_name);
		let mut attributes = self.attributes.borrow_mut();
		match attributes
			.iter_mut()
			.find(|attribute| attribute.namespace.as_deref() == namespace && attribute.local_name() == local)
		{
			Some(attribute) => {
				attribute.name = qualified_name.to_owned();
				attribute.value = value.to_owned();
			}
			None => attributes.push(Attribute {
				namespace: namespace.map(ToOwned::to_owned),
				name: qualified_name.to_owned(),
				value: value.to_owned(),
			}),
		}
	}

	#[must_use]
	pub fn get_attribute_ns(&self, namespace: Option<&str>, local_name: &str) -> Option<String> {
		let attributes = self.attributes.borrow();
		attributes
			.iter()
			.find(|attribute| attribute.namespace.as_deref() == namespace && attribute.local_name() == local_name)
			.map(|attribute| attribute.value.clone())
	}

	/// Returns whether the attribute was present.
	pub fn remove_attribute_ns(&self, namespace: Option<&str>, local_name: &str) -> bool {
		let mut attributes = self.attributes.borrow_mut();
		let before = attributes.len();
		attributes.retain(|attribute| !(attribute.namespace.as_deref() == namespace && attribute.local_name() == local_name));
		attributes.len() != before
	}

	/// The element's inline style declaration, created on first use.
	pub fn style(&self) -> Rc<Style> {
		self.style.get_or_init(Style::new).clone()
	}

	#[must_use]
	pub fn text_content(&self) -> String {
		match self.data {
			NodeData::Text | NodeData::Comment => self.text.borrow().clone(),
			NodeData::Element { .. } | NodeData::Document => self
				.children
				.borrow()
				.iter()
				.filter(|child| !matches!(child.data, NodeData::Comment))
				.map(|child| child.text_content())
				.collect(),
		}
	}

	/// Replaces all children of an element with a single text node (or none, if `text` is empty).
	pub fn set_text_content(&self, text: &str) {
		match self.data {
			NodeData::Text | NodeData::Comment => *self.text.borrow_mut() = text.to_owned(),
			NodeData::Element { .. } => {
				for child in self.children() {
					child.remove();
				}
				if !text.is_empty() {
					self.adopt(self.create_text_node(text), None);
				}
			}
			NodeData::Document => (),
		}
	}

	/// Registers `callback` unless the same (`kind`, `callback`, `capture`) combination is already registered.
	pub fn add_event_listener(&self, kind: &str, callback: Callback, capture: bool) {
		let mut listeners = self.listeners.borrow_mut();
		if !listeners
			.iter()
			.any(|listener| listener.kind == kind && listener.callback == callback && listener.capture == capture)
		{
			listeners.push(Listener {
				kind: kind.to_owned(),
				callback,
				capture,
			});
		}
	}

	pub fn remove_event_listener(&self, kind: &str, callback: &Callback, capture: bool) {
		self.listeners
			.borrow_mut()
			.retain(|listener| !(listener.kind == kind && listener.callback == *callback && listener.capture == capture));
	}

	#[must_use]
	pub fn listener_count(&self, kind: &str) -> usize {
		self.listeners.borrow().iter().filter(|listener| listener.kind == kind).count()
	}

	/// Invokes the listeners registered for `kind` on this node (without propagation) and returns how many ran.
	pub fn dispatch_event(&self, kind: &str) -> usize {
		let callbacks = self
			.listeners
			.borrow()
			.iter()
			.filter(|listener| listener.kind == kind)
			.map(|listener| listener.callback.clone())
			.collect::<Vec<_>>();
		for callback in &callbacks {
			if let Err(error) = callback.call(&[Value::from(kind)]) {
				warn!(event = kind, %error, "Event listener failed.");
			}
		}
		callbacks.len()
	}
}

/// Queries and serialization.
impl Node {
	/// The first descendant element in tree order that matches `selector`.
	///
	/// # Errors
	///
	/// [`HostError::Syntax`] iff `selector` can't be parsed.
	pub fn query_selector(&self, selector: &str) -> Result<Option<Rc<Node>>, HostError> {
		let selector = SelectorList::parse(selector)?;
		let mut found = None;
		self.walk(&mut |node| {
			if found.is_none() && selector.matches(node) {
				found = node.this.upgrade();
			}
			found.is_none()
		});
		Ok(found)
	}

	/// # Errors
	///
	/// [`HostError::Syntax`] iff `selector` can't be parsed.
	pub fn query_selector_all(&self, selector: &str) -> Result<Vec<Rc<Node>>, HostError> {
		let selector = SelectorList::parse(selector)?;
		let mut found = Vec::new();
		self.walk(&mut |node| {
			if selector.matches(node) {
				found.extend(node.this.upgrade());
			}
			true
		});
		Ok(found)
	}

	/// # Errors
	///
	/// [`HostError::Syntax`] iff `selector` can't be parsed.
	pub fn matches(&self, selector: &str) -> Result<bool, HostError> {
		Ok(SelectorList::parse(selector)?.matches(self))
	}

	#[must_use]
	pub fn get_element_by_id(&self, id: &str) -> Option<Rc<Node>> {
		let mut found = None;
		self.walk(&mut |node| {
			if node.is_element() && node.get_attribute("id").as_deref() == Some(id) {
				found = node.this.upgrade();
			}
			found.is_none()
		});
		found
	}

	/// Pre-order over descendant elements, stopping once `visit` returns `false`.
	fn walk(&self, visit: &mut dyn FnMut(&Node) -> bool) -> bool {
		for child in self.children() {
			if child.is_element() && !(visit(child.as_ref()) && child.walk(visit)) {
				return false;
			}
		}
		true
	}

	#[must_use]
	pub fn outer_html(&self) -> String {
		let mut html = String::new();
		self.serialize(&mut html);
		html
	}

	#[must_use]
	pub fn inner_html(&self) -> String {
		let mut html = String::new();
		for child in self.children.borrow().iter() {
			child.serialize(&mut html);
		}
		html
	}

	fn serialize(&self, html: &mut String) {
		match &self.data {
			NodeData::Document => html.push_str(&self.inner_html()),
			NodeData::Text => html.push_str(&escape(&self.text.borrow(), false)),
			NodeData::Comment => {
				html.push_str("<!--");
				html.push_str(&self.text.borrow());
				html.push_str("-->");
			}
			NodeData::Element { name, .. } => {
				html.push('<');
				html.push_str(name);
				for attribute in self.attributes.borrow().iter() {
					push_attribute(html, &attribute.name, &attribute.value);
				}
				if let Some(style) = self.get_attribute("style") {
					push_attribute(html, "style", &style);
				}
				html.push('>');
				if self.is_html() && VOID_ELEMENTS.contains(&name.as_str()) {
					return;
				}
				html.push_str(&self.inner_html());
				html.push_str("</");
				html.push_str(name);
				html.push('>');
			}
		}
	}
}

fn push_attribute(html: &mut String, name: &str, value: &str) {
	html.push(' ');
	html.push_str(name);
	html.push_str("=\"");
	html.push_str(&escape(value, true));
	html.push('"');
}

fn escape(text: &str, attribute: bool) -> String {
	let mut escaped = String::with_capacity(text.len());
	for c in text.chars() {
		match c {
			'&' => escaped.push_str("&amp;"),
			'<' => escaped.push_str("&lt;"),
			'>' => escaped.push_str("&gt;"),
			'"' if attribute => escaped.push_str("&quot;"),
			c => escaped.push(c),
		}
	}
	escaped
}

impl Debug for Node {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match &self.data {
			NodeData::Document => write!(f, "#document#{}", self.id.get()),
			NodeData::Element { name, .. } => write!(f, "<{}>#{}", name, self.id.get()),
			#[cfg(feature = "dangerous-logging")]
			NodeData::Text => write!(f, "#text({:?})#{}", self.text.borrow(), self.id.get()),
			#[cfg(not(feature = "dangerous-logging"))]
			NodeData::Text => write!(f, "#text#{}", self.id.get()),
			NodeData::Comment => write!(f, "#comment#{}", self.id.get()),
		}
	}
}

fn object(node: Rc<Node>) -> Value {
	Value::Object(node)
}

fn optional_object(node: Option<Rc<Node>>) -> Value {
	node.map_or(Value::Null, object)
}

fn node_arg(method: &str, args: &[Value], index: usize) -> Result<Rc<Node>, HostError> {
	optional_node_arg(method, args, index)?.ok_or_else(|| HostError::InvalidArgument {
		method: method.to_owned(),
		index,
		expected: "a memory node",
	})
}

fn optional_node_arg(method: &str, args: &[Value], index: usize) -> Result<Option<Rc<Node>>, HostError> {
	match args.get(index) {
		None | Some(Value::Undefined | Value::Null) => Ok(None),
		Some(Value::Object(object)) => match object.as_any().downcast_ref::<Node>().and_then(|node| node.this.upgrade()) {
			Some(node) => Ok(Some(node)),
			None => Err(HostError::InvalidArgument {
				method: method.to_owned(),
				index,
				expected: "a memory node",
			}),
		},
		Some(_) => Err(HostError::InvalidArgument {
			method: method.to_owned(),
			index,
			expected: "a memory node",
		}),
	}
}

fn listener_args(method: &str, args: &[Value]) -> Result<Option<(String, Callback, bool)>, HostError> {
	let kind = string_arg(method, args, 0)?.to_owned();
	let callback = match args.get(1) {
		None | Some(Value::Undefined | Value::Null) => return Ok(None),
		Some(Value::Function(callback)) => callback.clone(),
		Some(_) => {
			return Err(HostError::InvalidArgument {
				method: method.to_owned(),
				index: 1,
				expected: "a function",
			})
		}
	};
	let capture = match args.get(2) {
		Some(Value::Bool(capture)) => *capture,
		Some(Value::Object(options)) => options.get("capture").as_bool().unwrap_or(false),
		_ => false,
	};
	Ok(Some((kind, callback, capture)))
}

fn display(value: Option<&Value>) -> String {
	value.map(Value::to_display_string).unwrap_or_else(|| "undefined".to_owned())
}

impl Node {
	fn methods(&self) -> impl Iterator<Item = &'static str> {
		let (specific, query): (&[&str], bool) = match self.data {
			NodeData::Document => (DOCUMENT_METHODS, true),
			NodeData::Element { .. } => (ELEMENT_METHODS, true),
			NodeData::Text | NodeData::Comment => (&[], false),
		};
		let query: &[&str] = if query { QUERY_METHODS } else { &[] };
		NODE_METHODS.iter().chain(query).chain(specific).copied()
	}

	fn has_method(&self, name: &str) -> bool {
		self.methods().any(|method| method == name)
	}

	fn property_names(&self) -> impl Iterator<Item = &'static str> {
		let specific: &[&str] = match self.data {
			NodeData::Document => DOCUMENT_PROPERTIES,
			NodeData::Element { .. } => ELEMENT_PROPERTIES,
			NodeData::Text | NodeData::Comment => CHARACTER_DATA_PROPERTIES,
		};
		NODE_PROPERTIES.iter().chain(specific).copied()
	}

	fn method(&self, name: &str) -> Callback {
		let this = self.this.clone();
		let name = name.to_owned();
		Callback::new(move |args| match this.upgrade() {
			Some(node) => node.call(&name, args),
			None => Err(HostError::NoSuchMethod { kind: ObjectKind::Other, name: name.clone() }),
		})
	}
}

impl HostObject for Node {
	fn identity(&self) -> ObjectId {
		self.id
	}

	fn kind(&self) -> ObjectKind {
		match self.data {
			NodeData::Document => ObjectKind::Document,
			NodeData::Element { .. } => ObjectKind::Element,
			NodeData::Text => ObjectKind::Text,
			NodeData::Comment => ObjectKind::Comment,
		}
	}

	fn get(&self, name: &str) -> Value {
		if self.has_method(name) {
			return Value::Function(self.method(name));
		}
		let is_element = self.is_element();
		let is_character_data = matches!(self.data, NodeData::Text | NodeData::Comment);
		let is_document = matches!(self.data, NodeData::Document);
		match name {
			"nodeType" => Value::Number(self.node_type()),
			"nodeName" => Value::String(self.node_name()),
			"parentNode" => optional_object(self.parent()),
			"childNodes" => Value::Object(Rc::new(NodeList::new(self.children()))),
			"firstChild" => optional_object(self.children.borrow().first().cloned()),
			"lastChild" => optional_object(self.children.borrow().last().cloned()),
			"isConnected" => Value::Bool(self.is_connected()),
			"ownerDocument" => optional_object(self.owner_document()),
			"textContent" if is_document => Value::Null,
			"textContent" => Value::String(self.text_content()),
			"data" | "nodeValue" if is_character_data => Value::String(self.text.borrow().clone()),
			#[allow(clippy::cast_precision_loss)]
			"length" if is_character_data => Value::Number(self.text.borrow().chars().count() as f64),
			"documentElement" if is_document => optional_object(self.document_element()),
			"head" if is_document => optional_object(self.head()),
			"body" if is_document => optional_object(self.body()),
			"tagName" if is_element => Value::String(self.node_name()),
			"style" if is_element => Value::Object(self.style()),
			"value" if is_element => match self.properties.borrow().get(name) {
				Some(value) => value.clone(),
				None => Value::String(self.get_attribute("value").unwrap_or_default()),
			},
			"checked" if is_element => match self.properties.borrow().get(name) {
				Some(value) => value.clone(),
				None => Value::Bool(self.has_attribute("checked")),
			},
			_ => match reflected(name).filter(|_| is_element) {
				Some(attribute) => Value::String(self.get_attribute(attribute).unwrap_or_default()),
				None => self.properties.borrow().get(name).cloned().unwrap_or(Value::Undefined),
			},
		}
	}

	fn has(&self, name: &str) -> bool {
		self.has_method(name) || self.property_names().any(|property| property == name) || self.properties.borrow().contains_key(name)
	}

	fn set(&self, name: &str, value: Value) -> Result<(), HostError> {
		if self.has_method(name) || (READ_ONLY.contains(&name) && self.property_names().any(|property| property == name)) {
			return Err(HostError::ReadOnly(name.to_owned()));
		}
		let text = || if value.is_nullish() { String::new() } else { value.to_display_string() };
		match name {
			"textContent" => self.set_text_content(&text()),
			"data" | "nodeValue" if matches!(self.data, NodeData::Text | NodeData::Comment) => *self.text.borrow_mut() = text(),
			"checked" if self.is_element() => {
				let checked = !matches!(value, Value::Bool(false) | Value::Undefined | Value::Null);
				self.properties.borrow_mut().insert(name.to_owned(), Value::Bool(checked));
			}
			"value" if self.is_element() => {
				self.properties.borrow_mut().insert(name.to_owned(), Value::String(text()));
			}
			_ => match reflected(name).filter(|_| self.is_element()) {
				Some(attribute) => self.set_attribute(attribute, &value.to_display_string()),
				None => {
					self.properties.borrow_mut().insert(name.to_owned(), value);
				}
			},
		}
		Ok(())
	}

	fn delete(&self, name: &str) -> bool {
		self.properties.borrow_mut().remove(name).is_some()
	}

	fn call(&self, name: &str, args: &[Value]) -> Result<Value, HostError> {
		if !self.has_method(name) {
			return Err(HostError::NoSuchMethod { kind: self.kind(), name: name.to_owned() });
		}
		Ok(match name {
			"appendChild" => {
				let child = node_arg(name, args, 0)?;
				self.append_child(&child)?;
				object(child)
			}
			"insertBefore" => {
				let child = node_arg(name, args, 0)?;
				let reference = optional_node_arg(name, args, 1)?;
				self.insert_before(&child, reference.as_ref())?;
				object(child)
			}
			"removeChild" => {
				let child = node_arg(name, args, 0)?;
				self.remove_child(&child)?;
				object(child)
			}
			"contains" => Value::Bool(optional_node_arg(name, args, 0)?.map_or(false, |other| self.contains(&other))),
			"addEventListener" => {
				if let Some((kind, callback, capture)) = listener_args(name, args)? {
					self.add_event_listener(&kind, callback, capture);
				}
				Value::Undefined
			}
			"removeEventListener" => {
				if let Some((kind, callback, capture)) = listener_args(name, args)? {
					self.remove_event_listener(&kind, &callback, capture);
				}
				Value::Undefined
			}
			"dispatchEvent" => {
				self.dispatch_event(string_arg(name, args, 0)?);
				Value::Bool(true)
			}
			"querySelector" => optional_object(self.query_selector(string_arg(name, args, 0)?)?),
			"querySelectorAll" => Value::Object(Rc::new(NodeList::new(self.query_selector_all(string_arg(name, args, 0)?)?))),
			"getElementById" => optional_object(self.get_element_by_id(string_arg(name, args, 0)?)),
			"getAttribute" => self.get_attribute(string_arg(name, args, 0)?).into(),
			"setAttribute" => {
				self.set_attribute(string_arg(name, args, 0)?, &display(args.get(1)));
				Value::Undefined
			}
			"hasAttribute" => Value::Bool(self.has_attribute(string_arg(name, args, 0)?)),
			"removeAttribute" => {
				self.remove_attribute(string_arg(name, args, 0)?);
				Value::Undefined
			}
			"getAttributeNS" => self.get_attribute_ns(optional_string_arg(name, args, 0)?, string_arg(name, args, 1)?).into(),
			"setAttributeNS" => {
				self.set_attribute_ns(optional_string_arg(name, args, 0)?, string_arg(name, args, 1)?, &display(args.get(2)));
				Value::Undefined
			}
			"hasAttributeNS" => Value::Bool(self.get_attribute_ns(optional_string_arg(name, args, 0)?, string_arg(name, args, 1)?).is_some()),
			"removeAttributeNS" => {
				self.remove_attribute_ns(optional_string_arg(name, args, 0)?, string_arg(name, args, 1)?);
				Value::Undefined
			}
			"matches" => Value::Bool(self.matches(string_arg(name, args, 0)?)?),
			"createElement" => object(self.create_element(string_arg(name, args, 0)?)),
			"createElementNS" => object(self.create_element_ns(optional_string_arg(name, args, 0)?, string_arg(name, args, 1)?)),
			"createTextNode" => object(self.create_text_node(&display(args.first()))),
			"createComment" => object(self.create_comment(&display(args.first()))),
			_ => return Err(HostError::NoSuchMethod { kind: self.kind(), name: name.to_owned() }),
		})
	}

	fn own_keys(&self) -> Vec<String> {
		let mut keys = self.methods().chain(self.property_names()).map(ToOwned::to_owned).collect::<Vec<_>>();
		let mut expandos = self.properties.borrow().keys().filter(|key| !keys.contains(key)).cloned().collect::<Vec<_>>();
		expandos.sort();
		keys.extend(expandos);
		keys
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

/// A static [***NodeList***](https://developer.mozilla.org/en-US/docs/Web/API/NodeList) snapshot.
pub struct NodeList {
	id: ObjectId,
	nodes: Vec<Rc<Node>>,
}
impl NodeList {
	fn new(nodes: Vec<Rc<Node>>) -> Self {
		Self { id: ObjectId::next(), nodes }
	}
}

fn item(nodes: &[Rc<Node>], index: Option<f64>) -> Value {
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	let node = index.filter(|index| *index >= 0.0).and_then(|index| nodes.get(index as usize));
	optional_object(node.cloned())
}
impl Debug for NodeList {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(&self.nodes).finish()
	}
}
impl HostObject for NodeList {
	fn identity(&self) -> ObjectId {
		self.id
	}

	fn kind(&self) -> ObjectKind {
		ObjectKind::Other
	}

	fn get(&self, name: &str) -> Value {
		match name {
			#[allow(clippy::cast_precision_loss)]
			"length" => Value::Number(self.nodes.len() as f64),
			"item" => {
				let nodes = self.nodes.clone();
				Value::Function(Callback::new(move |args| Ok(item(&nodes, args.first().and_then(Value::as_f64)))))
			}
			_ => match name.parse::<f64>() {
				Ok(index) => item(&self.nodes, Some(index)),
				Err(_) => Value::Undefined,
			},
		}
	}

	fn has(&self, name: &str) -> bool {
		matches!(name, "length" | "item") || name.parse::<usize>().map_or(false, |index| index < self.nodes.len())
	}

	fn set(&self, name: &str, _: Value) -> Result<(), HostError> {
		Err(HostError::ReadOnly(name.to_owned()))
	}

	fn delete(&self, _: &str) -> bool {
		false
	}

	fn call(&self, name: &str, args: &[Value]) -> Result<Value, HostError> {
		match name {
			"item" => Ok(item(&self.nodes, args.first().and_then(Value::as_f64))),
			_ => Err(HostError::NoSuchMethod { kind: ObjectKind::Other, name: name.to_owned() }),
		}
	}

	fn own_keys(&self) -> Vec<String> {
		vec!["length".to_owned(), "item".to_owned()]
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

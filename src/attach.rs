//! Placement of generated subtrees into the host tree, and its inverse.
//!
//! Elements are matched against the host tree by selector and merged onto what they match, or inserted as-is if nothing matches.
//! Other nodes (text, comments) replace the pre-existing content of their parent instead, which is recorded so that it can be put back.

use crate::{
	blend::{vnode_of, BlendOptions, SELECTOR_KEY},
	host::{HostExt, HostRef, Value},
	vnode::{VNode, VNodeState},
};
use std::{collections::VecDeque, rc::Rc};
use tracing::{debug, error, instrument, trace, trace_span, warn};

/// Places `node` and, breadth-first, each resolved node's children.
///
/// `before` positions `node` itself (only). Its children are appended in order.
#[instrument(skip(before, options))]
pub fn attach(node: &Rc<VNode>, before: Option<&Rc<VNode>>, options: &BlendOptions) {
	let mut queue = VecDeque::new();
	queue.push_back((node.clone(), before.cloned(), 0_usize));
	while let Some((node, before, depth)) = queue.pop_front() {
		if depth > options.depth_limit {
			return error!("Depth limit reached");
		}
		if node.state() != VNodeState::Pending {
			warn!("Tried to attach non-pending node (state = {:?}).", node.state());
			continue;
		}
		let Some(parent) = node.parent() else {
			warn!("Tried to attach unparented node. Something is wrong.");
			continue;
		};
		let Some(scope) = parent.target() else {
			warn!("Tried to attach below an unresolved parent (state = {:?}).", parent.state());
			continue;
		};

		let span = trace_span!("Placing node", host = ?node.host(), depth);
		let _enter = span.enter();
		if node.host().is_element() {
			place_element(&node, &parent, &scope, before.as_ref());
		} else {
			place_other(&node, &parent, &scope, before.as_ref());
		}

		if node.is_resolved() {
			queue.extend(node.children().into_iter().map(|child| (child, None, depth + 1)));
		}
	}
}

fn place_element(node: &VNode, parent: &VNode, scope: &HostRef, before: Option<&Rc<VNode>>) {
	let declared = node.data(SELECTOR_KEY);
	// A directly placed parent has no pre-existing content, only generated siblings.
	let selector = declared.clone().or_else(|| match parent.state() {
		VNodeState::Direct => None,
		_ => implicit_selector(node.host()),
	});
	let found = selector.as_deref().and_then(|selector| match scope.query_selector(selector) {
		Ok(found) => found,
		Err(error) => {
			warn!("Treating selector {} as unmatched: {}", redacted(selector), error);
			None
		}
	});
	let own = found.as_ref().map_or(false, |found| found.same(node.host()));
	let found = found.filter(|found| !found.same(node.host()) && !is_generated(found));

	match (found, selector) {
		(Some(found), Some(selector)) => {
			debug!("Attaching to existing: {}", redacted(&selector));
			node.attach(found);
		}
		(None, Some(selector)) if declared.is_some() && !own => {
			warn!("Not found: {}. The node stays pending.", redacted(&selector));
		}
		(_, selector) => {
			if let Some(selector) = selector {
				trace!("Not found: {}. Inserting.", redacted(&selector));
			}
			insert(node, scope, before);
		}
	}
}

/// Whether `host` belongs to some generated node, which is never merged onto.
fn is_generated(host: &HostRef) -> bool {
	vnode_of(&Value::Object(host.clone())).is_some()
}

fn place_other(node: &VNode, parent: &VNode, scope: &HostRef, before: Option<&Rc<VNode>>) {
	// A directly placed parent has no pre-existing content.
	if parent.state() == VNodeState::Attached && parent.take_clean_slate() {
		clean_slate(parent, scope);
	}
	insert(node, scope, before);
}

/// Inserts the node's own host into `scope` (unless it's already there) and makes it the target.
fn insert(node: &VNode, scope: &HostRef, before: Option<&Rc<VNode>>) {
	let host = node.host();
	let result = if is_child_of(host, scope) {
		Ok(())
	} else {
		match before.and_then(|before| before.target()).filter(|reference| is_child_of(reference, scope)) {
			Some(reference) => scope.insert_before(host, Some(&reference)),
			None => scope.append_child(host),
		}
	};
	match result {
		Ok(()) => node.target_self(),
		Err(error) => warn!("Failed to insert generated node, which stays pending: {}", error),
	}
}

fn is_child_of(node: &HostRef, parent: &HostRef) -> bool {
	node.parent_node().map_or(false, |actual| actual.same(parent))
}

/// Removes the host children of `scope` that don't belong to generated nodes yet, and records how to put them back.
fn clean_slate(parent: &VNode, scope: &HostRef) {
	let claimed = parent.children().into_iter().filter_map(|sibling| sibling.target()).collect::<Vec<_>>();
	let original = scope.child_nodes();
	let removed = original
		.iter()
		.enumerate()
		.filter(|(_, child)| !claimed.iter().any(|claimed| claimed.same(child)))
		.map(|(index, child)| (index, child.clone()))
		.collect::<Vec<_>>();
	for (_, child) in &removed {
		if let Err(error) = scope.remove_child(child) {
			warn!("Failed to clear pre-existing child node: {}", error);
		}
	}
	trace!("Clean slate: Removed {} pre-existing child node(s).", removed.len());

	let scope = scope.clone();
	parent.restorable().push_undo(move || {
		for (index, child) in removed.iter().rev() {
			let next = original[index + 1..].iter().find(|sibling| is_child_of(sibling, &scope));
			if let Err(error) = scope.insert_before(child, next) {
				warn!("Failed to put back pre-existing child node: {}", error);
			}
		}
	});
}

/// Derives a selector from the identifying attributes of `host`, an element.
///
/// In order of preference: `id`, `name`, for buttons and inputs `type`, for labels `for`.
#[must_use]
pub fn implicit_selector(host: &HostRef) -> Option<String> {
	let tag = host.tag_name()?;
	let attribute = |name: &str| host.get_attribute(name).ok().flatten().filter(|value| !value.is_empty());

	if let Some(id) = attribute("id") {
		return Some(if is_identifier(&id) {
			format!("{}#{}", tag, id)
		} else {
			format!("{}[id=\"{}\"]", tag, escape(&id))
		});
	}
	if let Some(name) = attribute("name") {
		return Some(format!("{}[name=\"{}\"]", tag, escape(&name)));
	}
	let (key, value) = match tag.as_str() {
		"button" | "input" => ("type", attribute("type")?),
		"label" => ("for", attribute("for")?),
		_ => return None,
	};
	Some(format!("{}[{}=\"{}\"]", tag, key, escape(&value)))
}

fn is_identifier(value: &str) -> bool {
	let value = value.strip_prefix('-').unwrap_or(value);
	value.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
		&& value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Escapes `value` for use in a double-quoted CSS string.
fn escape(value: &str) -> String {
	let mut escaped = String::with_capacity(value.len());
	for c in value.chars() {
		match c {
			'"' | '\\' => {
				escaped.push('\\');
				escaped.push(c);
			}
			'\n' => escaped.push_str("\\a "),
			c => escaped.push(c),
		}
	}
	escaped
}

fn redacted(selector: &str) -> &str {
	if cfg!(feature = "dangerous-logging") {
		selector
	} else {
		"[selector]"
	}
}

/// Undoes the placement of `node`'s subtree and detaches every node in it.
///
/// Nodes are handled children-first: Directly placed hosts are removed (unless an ancestor's removal takes them along)
/// and merged hosts are restored.
#[instrument(skip(options))]
pub fn detach(node: &Rc<VNode>, options: &BlendOptions) {
	let mut visited = Vec::new();
	let mut queue = VecDeque::new();
	queue.push_back((node.clone(), 0_usize));
	while let Some((current, depth)) = queue.pop_front() {
		if depth > options.depth_limit {
			error!("Depth limit reached");
			break;
		}
		queue.extend(current.children().into_iter().map(|child| (child, depth + 1)));
		visited.push(current);
	}

	for current in visited.iter().rev() {
		match current.state() {
			VNodeState::Direct if !removed_with_ancestor(current, node) => {
				let host = current.host();
				trace!("Detach: Removing {:?}.", host);
				if let Some(parent) = host.parent_node() {
					if let Err(error) = parent.remove_child(host) {
						warn!("Failed to remove generated node: {}", error);
					}
				}
			}
			VNodeState::Attached => {
				trace!("Detach: Restoring {:?}.", current.target());
				current.restore();
			}
			VNodeState::Direct | VNodeState::Pending | VNodeState::Detached => (),
		}
		current.detach();
	}
}

fn removed_with_ancestor(node: &Rc<VNode>, root: &Rc<VNode>) -> bool {
	if Rc::ptr_eq(node, root) {
		return false;
	}
	let mut current = node.parent();
	while let Some(ancestor) = current {
		if ancestor.state() == VNodeState::Direct {
			return true;
		}
		if Rc::ptr_eq(&ancestor, root) {
			return false;
		}
		current = ancestor.parent();
	}
	false
}

#[cfg(test)]
mod tests {
	use super::{attach, detach, implicit_selector};
	use crate::{
		blend::BlendOptions,
		host::{HostExt, HostRef},
		memory::Node,
		vnode::{VNode, VNodeState},
	};
	use std::rc::Rc;

	fn element(document: &Rc<Node>, tag: &str, attributes: &[(&str, &str)]) -> Rc<Node> {
		let element = document.create_element(tag);
		for (name, value) in attributes {
			element.set_attribute(name, value);
		}
		element
	}

	fn root(container: &Rc<Node>) -> Rc<VNode> {
		let root = VNode::new(container.clone());
		root.attach(container.clone());
		root
	}

	#[test]
	fn selectors() {
		let document = Node::new_document();
		let selector = |tag: &str, attributes: &[(&str, &str)]| implicit_selector(&(element(&document, tag, attributes) as HostRef));
		assert_eq!(selector("div", &[("id", "main"), ("name", "x")]).as_deref(), Some("div#main"));
		assert_eq!(selector("div", &[("id", "1st")]).as_deref(), Some("div[id=\"1st\"]"));
		assert_eq!(selector("input", &[("name", "say \"hi\"")]).as_deref(), Some(r#"input[name="say \"hi\""]"#));
		assert_eq!(selector("button", &[("type", "submit")]).as_deref(), Some("button[type=\"submit\"]"));
		assert_eq!(selector("div", &[("type", "submit")]), None);
		assert_eq!(selector("label", &[("for", "agreement")]).as_deref(), Some("label[for=\"agreement\"]"));
		assert_eq!(selector("p", &[]), None);
	}

	#[test]
	fn merges_or_inserts() {
		let document = Node::new_document();
		let body = document.body().unwrap();
		let existing = element(&document, "input", &[("name", "phone")]);
		body.append_child(&existing).unwrap();
		let root = root(&body);

		let merged = VNode::new(element(&document, "input", &[("name", "phone")]));
		let inserted = VNode::new(element(&document, "p", &[]));
		root.append_child(&merged);
		root.append_child(&inserted);
		attach(&merged, None, &BlendOptions::default());
		attach(&inserted, None, &BlendOptions::default());

		assert_eq!(merged.state(), VNodeState::Attached);
		assert!(merged.target().unwrap().same(&(existing.clone() as HostRef)));
		assert_eq!(inserted.state(), VNodeState::Direct);
		assert_eq!(body.inner_html(), "<input name=\"phone\"><p></p>");

		detach(&inserted, &BlendOptions::default());
		detach(&merged, &BlendOptions::default());
		assert_eq!(body.inner_html(), "<input name=\"phone\">");
		assert_eq!(inserted.state(), VNodeState::Detached);
		assert_eq!(merged.state(), VNodeState::Detached);
	}

	#[test]
	fn siblings_under_a_direct_parent_are_inserted() {
		let document = Node::new_document();
		let body = document.body().unwrap();
		let root = root(&body);
		let fieldset = VNode::new(element(&document, "fieldset", &[]));
		root.append_child(&fieldset);
		attach(&fieldset, None, &BlendOptions::default());

		let radios = ["red", "blue"].map(|value| {
			let host = element(&document, "input", &[("type", "radio"), ("name", "color"), ("value", value)]);
			fieldset.host().append_child(&(host.clone() as HostRef)).unwrap();
			let radio = VNode::new(host);
			fieldset.append_child(&radio);
			attach(&radio, None, &BlendOptions::default());
			radio
		});

		for radio in &radios {
			assert_eq!(radio.state(), VNodeState::Direct);
			assert!(radio.target().unwrap().same(radio.host()));
		}
		assert_eq!(
			body.inner_html(),
			"<fieldset><input type=\"radio\" name=\"color\" value=\"red\"><input type=\"radio\" name=\"color\" value=\"blue\"></fieldset>"
		);
	}

	#[test]
	fn declared_selector_is_mandatory() {
		let document = Node::new_document();
		let body = document.body().unwrap();
		let root = root(&body);
		let quote = VNode::new(element(&document, "blockquote", &[]));
		quote.set_data("selector", "#quote");
		quote.append_child(&VNode::new(document.create_text_node("...")));
		root.append_child(&quote);

		attach(&quote, None, &BlendOptions::default());
		assert_eq!(quote.state(), VNodeState::Pending);
		assert_eq!(quote.children()[0].state(), VNodeState::Pending);
		assert_eq!(body.inner_html(), "");
	}

	#[test]
	fn breadth_first_with_depth_limit() {
		let document = Node::new_document();
		let body = document.body().unwrap();
		let root = root(&body);
		let outer = VNode::new(element(&document, "section", &[]));
		let inner = VNode::new(element(&document, "div", &[]));
		let leaf = VNode::new(element(&document, "span", &[]));
		root.append_child(&outer);
		outer.append_child(&inner);
		inner.append_child(&leaf);

		let options = BlendOptions { depth_limit: 1, ..BlendOptions::default() };
		attach(&outer, None, &options);
		assert_eq!(outer.state(), VNodeState::Direct);
		assert_eq!(inner.state(), VNodeState::Direct);
		assert_eq!(leaf.state(), VNodeState::Pending);

		detach(&outer, &options);
		assert_eq!(leaf.state(), VNodeState::Pending);
		assert_eq!(inner.state(), VNodeState::Detached);
		assert_eq!(body.inner_html(), "");
	}

	#[test]
	fn text_replaces_existing_content_once() {
		let document = Node::new_document();
		let body = document.body().unwrap();
		let label = element(&document, "label", &[("for", "agreement")]);
		label.append_child(&document.create_text_node("I agree")).unwrap();
		label.append_child(&element(&document, "b", &[])).unwrap();
		body.append_child(&label).unwrap();
		let root = root(&body);

		let generated = VNode::new(element(&document, "label", &[("for", "agreement")]));
		root.append_child(&generated);
		attach(&generated, None, &BlendOptions::default());
		assert_eq!(generated.state(), VNodeState::Attached);

		for text in ["Yes, ", "I do"] {
			let text = VNode::new(document.create_text_node(text));
			generated.append_child(&text);
			attach(&text, None, &BlendOptions::default());
		}
		assert_eq!(label.inner_html(), "Yes, I do");

		detach(&generated, &BlendOptions::default());
		assert_eq!(label.inner_html(), "I agree<b></b>");
	}
}

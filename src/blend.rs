//! Interception of the renderer's calls, and the entry points.
//!
//! The renderer only ever sees wrappers: The root returned by [`blend_root`] wraps the render container (or a placeholder in it),
//! its `ownerDocument` wraps the real document, and every node created through that document is wrapped in turn.
//! Each generated node is backed by a [`VNode`] that records where its mutations should end up.

use crate::{
	attach,
	host::{HostError, HostExt, HostObject, HostRef, Value},
	proxy::{as_proxy, existing, unwrap, unwrap_args, wrap, Override, Policy, Proxy},
	restore::{is_read_only, Restorable},
	trace::{untrace, Traced},
	vnode::VNode,
};
use core::any::Any;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

/// Attribute name prefix (matched case-insensitively) that is diverted into the generated node's private data.
pub const RESERVED_PREFIX: &str = "data-blend-";
/// Private data key of a mandatory selector. A node that declares one is only ever merged, never inserted.
pub const SELECTOR_KEY: &str = "selector";
/// Private data key that raises the interception log level of a node from `TRACE` to `DEBUG`.
pub const DEBUG_KEY: &str = "debug";

const VNODE_KEY: &str = "dom-blend.vnode";
const PLACEHOLDER_ID: &str = "_blendRoot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlendOptions {
	/// Hand the renderer a [`Traced`] root, which logs every access.
	pub trace_use: bool,
	/// How deep [`attach::attach`] and [`attach::detach`] descend below the node they start from.
	pub depth_limit: usize,
}
impl Default for BlendOptions {
	fn default() -> Self {
		Self {
			trace_use: false,
			depth_limit: 1024,
		}
	}
}

#[derive(Debug, Error)]
pub enum BlendError {
	#[error("the render container is not connected to a document")]
	ContainerDetached,
	#[error(transparent)]
	Host(#[from] HostError),
}

/// Runs `render` against a blended root for `container` and returns that root.
///
/// # Errors
///
/// Iff [`blend_root`] fails or `render` does.
#[instrument(skip(render, options))]
pub fn blend(
	render: impl FnOnce(&HostRef) -> Result<(), HostError>,
	container: &HostRef,
	options: BlendOptions,
) -> Result<HostRef, BlendError> {
	let trace_use = options.trace_use;
	let root = blend_root(container, options)?;
	if trace_use {
		let traced: HostRef = Rc::new(Traced::new(root.clone(), "domRoot"));
		render(&traced)?;
	} else {
		render(&root)?;
	}
	Ok(root)
}

/// Creates the root wrapper a renderer should mount into instead of `container`.
///
/// If `container` is the document's `<body>` or `<html>`, a placeholder `<div id="_blendRoot">` in the body is used as generated root host
/// (and reused by later calls).
///
/// # Errors
///
/// [`BlendError::ContainerDetached`] iff `container` is not part of a document,
/// [`BlendError::Host`] iff creating the placeholder fails.
#[instrument(skip(options))]
pub fn blend_root(container: &HostRef, options: BlendOptions) -> Result<HostRef, BlendError> {
	if !container.is_connected() {
		return Err(BlendError::ContainerDetached);
	}
	let document = container.get("ownerDocument").into_object().ok_or(BlendError::ContainerDetached)?;
	let host = placeholder(container, &document)?;

	let vnode = VNode::new(host.clone());
	vnode.attach(container.clone());
	let options = Rc::new(options);
	let policy = node_policy(&vnode, &options)
		.with("appendChild", Override::new().on_invoke(root_insert(&vnode, &options)))
		.with("insertBefore", Override::new().on_invoke(root_insert(&vnode, &options)))
		.with("removeChild", Override::new().on_invoke(root_remove(&vnode, &options)));
	Ok(wrap(host, policy))
}

fn placeholder(container: &HostRef, document: &HostRef) -> Result<HostRef, HostError> {
	let is_top_level = ["body", "documentElement"]
		.iter()
		.any(|name| document.get(name).as_object().map_or(false, |node| node.same(container)));
	if !is_top_level {
		return Ok(container.clone());
	}
	if let Some(existing) = document.call("getElementById", &[PLACEHOLDER_ID.into()])?.into_object() {
		trace!("Reusing placeholder.");
		return Ok(existing);
	}
	let placeholder = created(document, "createElement", &["div".into()])?;
	placeholder.set("id", PLACEHOLDER_ID.into())?;
	let body = document.get("body").into_object().ok_or_else(|| HostError::UnexpectedReturn {
		method: "body".to_owned(),
		expected: "an element",
	})?;
	body.append_child(&placeholder)?;
	debug!("Created placeholder.");
	Ok(placeholder)
}

fn created(document: &HostRef, method: &str, args: &[Value]) -> Result<HostRef, HostError> {
	document.call(method, args)?.into_object().ok_or_else(|| HostError::UnexpectedReturn {
		method: method.to_owned(),
		expected: "a node",
	})
}

/// The [`VNode`] behind `value`, which may be a (possibly traced) wrapper or a generated host node whose wrapper is still alive.
#[must_use]
pub fn vnode_of(value: &Value) -> Option<Rc<VNode>> {
	let value = untrace(value);
	let proxy = as_proxy(&value).or_else(|| value.as_object().and_then(existing))?;
	proxy.extension::<VNode>(VNODE_KEY)
}

fn blend_document(document: HostRef, options: &Rc<BlendOptions>) -> Rc<Proxy> {
	let create = Override::new().on_invoke({
		let options = options.clone();
		move |document, name, args| {
			trace!("[CALL] document.{}()", name);
			let host = created(document, name, &unwrap_args(args))?;
			Ok(Value::Object(blend_node(host, &options)))
		}
	});
	let policy = ["createElement", "createElementNS", "createTextNode", "createComment"]
		.iter()
		.fold(Policy::new(), |policy, name| policy.with(name, create.clone()));
	wrap(document, policy)
}

fn blend_node(host: HostRef, options: &Rc<BlendOptions>) -> HostRef {
	let vnode = VNode::new(host.clone());
	wrap(host, node_policy(&vnode, options))
}

fn node_policy(vnode: &Rc<VNode>, options: &Rc<BlendOptions>) -> Policy {
	Policy::new()
		.with(
			"ownerDocument",
			Override::new().on_wrap({
				let options = options.clone();
				move |document| match document {
					Value::Object(document) => Value::Object(blend_document(document, &options)),
					other => other,
				}
			}),
		)
		.with(
			"style",
			Override::new().on_wrap({
				let vnode = vnode.clone();
				move |style| match style {
					Value::Object(style) => Value::Object(blend_style(style, &vnode)),
					other => other,
				}
			}),
		)
		.with("appendChild", Override::new().on_invoke(insert(vnode, options)))
		.with("insertBefore", Override::new().on_invoke(insert(vnode, options)))
		.with("removeChild", Override::new().on_invoke(remove(vnode, options)))
		.with(
			"setAttribute",
			reserved_channel(vnode, |vnode, key, args| {
				vnode.set_data(&key, &args.get(1).map(Value::to_display_string).unwrap_or_default());
				Value::Undefined
			}),
		)
		.with(
			"removeAttribute",
			reserved_channel(vnode, |vnode, key, _| {
				vnode.remove_data(&key);
				Value::Undefined
			}),
		)
		.with("getAttribute", reserved_channel(vnode, |vnode, key, _| vnode.data(&key).into()))
		.with("hasAttribute", reserved_channel(vnode, |vnode, key, _| vnode.data(&key).is_some().into()))
		.with_default(
			Override::new()
				.on_set({
					let vnode = vnode.clone();
					move |host, name, value| intercept_set(&vnode, host, name, &value)
				})
				.on_invoke({
					let vnode = vnode.clone();
					move |host, name, args| intercept_call(&vnode, host, name, args)
				}),
		)
		.extend(VNODE_KEY, vnode.clone() as Rc<dyn Any>)
}

fn reserved_key(attribute: &str) -> Option<String> {
	attribute.to_ascii_lowercase().strip_prefix(RESERVED_PREFIX).map(ToOwned::to_owned)
}

/// Diverts calls whose first argument is a reserved attribute name to `divert`. Other calls are intercepted as usual.
fn reserved_channel(vnode: &Rc<VNode>, divert: fn(&VNode, String, &[Value]) -> Value) -> Override {
	let vnode = vnode.clone();
	Override::new().on_invoke(move |host, name, args| match args.first().and_then(Value::as_str).and_then(reserved_key) {
		Some(key) => {
			log_access(&vnode, "DATA", &key);
			Ok(divert(&vnode, key, args))
		}
		None => intercept_call(&vnode, host, name, args),
	})
}

fn log_access(vnode: &VNode, kind: &str, name: &str) {
	if vnode.data(DEBUG_KEY).map_or(false, |debug| debug != "false") {
		debug!("[{}] {:?}.{}", kind, vnode.host(), name);
	} else {
		trace!("[{}] {:?}.{}", kind, vnode.host(), name);
	}
}

/// Runs `apply` against the node's target once it's resolved, unless the node is its own target.
fn mirror(vnode: &Rc<VNode>, apply: impl FnOnce(&HostRef, &Restorable) -> Result<(), HostError> + 'static) {
	let weak = Rc::downgrade(vnode);
	vnode.dispatch(move |target| {
		let Some(vnode) = weak.upgrade() else {
			return;
		};
		if target.same(vnode.host()) {
			return;
		}
		if let Err(error) = apply(target, &vnode.restorable()) {
			warn!("Failed to mirror mutation onto the host tree: {}", error);
		}
	});
}

fn intercept_set(vnode: &Rc<VNode>, host: &HostRef, name: &str, value: &Value) -> Result<(), HostError> {
	log_access(vnode, "SET ", name);
	let value = unwrap(value);
	let (property, mirrored) = (name.to_owned(), value.clone());
	mirror(vnode, move |target, restorable| restorable.set(target, &property, mirrored));
	host.set(name, value)
}

fn intercept_call(vnode: &Rc<VNode>, host: &HostRef, name: &str, args: &[Value]) -> Result<Value, HostError> {
	log_access(vnode, "CALL", name);
	let args = unwrap_args(args);
	if !is_read_only(name) {
		let (method, mirrored) = (name.to_owned(), args.clone());
		mirror(vnode, move |target, restorable| restorable.invoke_node(target, &method, &mirrored).map(drop));
	}
	host.call(name, &args)
}

fn blend_style(style: HostRef, vnode: &Rc<VNode>) -> Rc<Proxy> {
	let method = Override::new().on_invoke({
		let vnode = vnode.clone();
		move |style, name, args| {
			log_access(&vnode, "CALL", &format!("style.{}", name));
			let args = unwrap_args(args);
			let (method, mirrored) = (name.to_owned(), args.clone());
			mirror(&vnode, move |target, restorable| {
				restorable.sub("style").invoke_style(&target_style(target)?, &method, &mirrored).map(drop)
			});
			style.call(name, &args)
		}
	});
	let property = Override::new().on_set({
		let vnode = vnode.clone();
		move |style, name, value| {
			log_access(&vnode, "SET ", &format!("style.{}", name));
			let value = unwrap(&value);
			let (property, mirrored) = (name.to_owned(), value.clone());
			mirror(&vnode, move |target, restorable| restorable.sub("style").set_style(&target_style(target)?, &property, mirrored));
			style.set(name, value)
		}
	});
	wrap(
		style,
		Policy::new().with("setProperty", method.clone()).with("removeProperty", method).with_default(property),
	)
}

fn target_style(target: &HostRef) -> Result<HostRef, HostError> {
	target.style().ok_or_else(|| HostError::UnexpectedReturn {
		method: "style".to_owned(),
		expected: "a style declaration",
	})
}

type Invoker = Box<dyn Fn(&HostRef, &str, &[Value]) -> Result<Value, HostError>>;

/// `appendChild` and `insertBefore` on generated nodes.
fn insert(vnode: &Rc<VNode>, options: &Rc<BlendOptions>) -> Invoker {
	let (vnode, options) = (vnode.clone(), options.clone());
	Box::new(move |host, name, args| {
		log_access(&vnode, "CALL", name);
		let child = args.first().cloned().unwrap_or(Value::Undefined);
		let reference = args.get(1).filter(|reference| !reference.is_nullish()).cloned();

		let raw_reference = reference
			.as_ref()
			.map(unwrap)
			.and_then(Value::into_object)
			.filter(|reference| reference.parent_node().map_or(false, |parent| parent.same(host)));
		match raw_reference {
			Some(raw_reference) => host.call("insertBefore", &[unwrap(&child), Value::Object(raw_reference)])?,
			None => {
				if reference.is_some() {
					debug!("Reference node left its generated parent. Appending instead.");
				}
				host.call("appendChild", &[unwrap(&child)])?
			}
		};

		if let Some(child_vnode) = vnode_of(&child) {
			let reference_vnode = reference.as_ref().and_then(vnode_of);
			vnode.insert_before(&child_vnode, reference_vnode.as_ref());
			reconcile(&child, &child_vnode);
			if vnode.is_resolved() {
				attach::attach(&child_vnode, reference_vnode.as_ref(), &options);
			}
		}
		Ok(child)
	})
}

/// `removeChild` on generated nodes.
fn remove(vnode: &Rc<VNode>, options: &Rc<BlendOptions>) -> Invoker {
	let (vnode, options) = (vnode.clone(), options.clone());
	Box::new(move |host, name, args| {
		log_access(&vnode, "CALL", name);
		let child = args.first().cloned().unwrap_or(Value::Undefined);
		if let Some(child_vnode) = vnode_of(&child) {
			vnode.remove_child(&child_vnode);
			if vnode.is_resolved() {
				attach::detach(&child_vnode, &options);
			} else {
				child_vnode.detach();
			}
		}
		let raw = unwrap(&child).into_object();
		if let Some(raw) = raw.filter(|raw| raw.parent_node().map_or(false, |parent| parent.same(host))) {
			host.remove_child(&raw)?;
		}
		Ok(child)
	})
}

/// `appendChild` and `insertBefore` on the root. These only ever place into the host tree.
fn root_insert(root: &Rc<VNode>, options: &Rc<BlendOptions>) -> Invoker {
	let (root, options) = (root.clone(), options.clone());
	Box::new(move |_, name, args| {
		log_access(&root, "CALL", name);
		let child = args.first().cloned().unwrap_or(Value::Undefined);
		let Some(child_vnode) = vnode_of(&child) else {
			warn!("Ignored {} of a node that wasn't created through the blended document.", name);
			return Ok(child);
		};
		let reference_vnode = args.get(1).and_then(vnode_of);
		root.insert_before(&child_vnode, reference_vnode.as_ref());
		reconcile(&child, &child_vnode);
		attach::attach(&child_vnode, reference_vnode.as_ref(), &options);
		Ok(child)
	})
}

fn root_remove(root: &Rc<VNode>, options: &Rc<BlendOptions>) -> Invoker {
	let (root, options) = (root.clone(), options.clone());
	Box::new(move |_, name, args| {
		log_access(&root, "CALL", name);
		let child = args.first().cloned().unwrap_or(Value::Undefined);
		match vnode_of(&child) {
			Some(child_vnode) if root.remove_child(&child_vnode) => attach::detach(&child_vnode, &options),
			_ => trace!("Ignored removal of a node that isn't a generated child of the root."),
		}
		Ok(child)
	})
}

/// Picks up renderer-internal fields (starting with `_`) set on a generated node before it was wrapped,
/// and replays them through the wrapper so that they are mirrored like later assignments.
fn reconcile(child: &Value, vnode: &VNode) {
	let Some(proxy) = as_proxy(&untrace(child)) else {
		return;
	};
	if !vnode.take_reconcile() {
		return;
	}
	let names = proxy
		.target()
		.own_keys()
		.into_iter()
		.filter(|name| name.starts_with('_') && !proxy.is_intercepted(name))
		.collect::<Vec<_>>();
	if names.is_empty() {
		return;
	}
	trace!("Reconciling {} renderer-internal field(s).", names.len());
	proxy.update(&names);
	for name in &names {
		let value = proxy.target().get(name);
		if let Err(error) = proxy.set(name, value) {
			warn!("Failed to reconcile {:?}: {}", name, error);
		}
	}
}

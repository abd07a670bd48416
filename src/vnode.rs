//! Records for generated nodes, and the tree they form.

use crate::{
	host::{HostExt, HostRef},
	restore::Restorable,
};
use core::{
	cell::{Cell, OnceCell, RefCell},
	fmt::{self, Debug, Formatter},
};
use hashbrown::HashMap;
use std::{
	collections::VecDeque,
	rc::{Rc, Weak},
};
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VNodeState {
	/// No host target has been resolved yet.
	Pending,
	/// Merged onto a pre-existing host node.
	Attached,
	/// Inserted as-is. The generated node is its own target.
	Direct,
	/// Terminal.
	Detached,
}

type Op = Box<dyn FnOnce(&HostRef)>;

/// One node of the tree the renderer generated.
pub struct VNode {
	host: HostRef,
	parent: RefCell<Weak<VNode>>,
	children: RefCell<Vec<Rc<VNode>>>,
	state: Cell<VNodeState>,
	target: RefCell<Option<HostRef>>,
	pending: RefCell<Option<VecDeque<Op>>>,
	data: RefCell<HashMap<String, String>>,
	restorable: OnceCell<Rc<Restorable>>,
	reconciled: Cell<bool>,
	clean_slate: Cell<bool>,
}
impl VNode {
	/// Creates a [`VNodeState::Pending`] record for the generated (unwrapped) host node `host`.
	#[must_use]
	pub fn new(host: HostRef) -> Rc<Self> {
		Rc::new(Self {
			host,
			parent: RefCell::default(),
			children: RefCell::default(),
			state: Cell::new(VNodeState::Pending),
			target: RefCell::default(),
			pending: RefCell::new(Some(VecDeque::new())),
			data: RefCell::default(),
			restorable: OnceCell::new(),
			reconciled: Cell::new(false),
			clean_slate: Cell::new(false),
		})
	}

	#[must_use]
	pub fn host(&self) -> &HostRef {
		&self.host
	}

	#[must_use]
	pub fn state(&self) -> VNodeState {
		self.state.get()
	}

	/// Whether a target has been resolved, i.e. the state is [`VNodeState::Attached`] or [`VNodeState::Direct`].
	#[must_use]
	pub fn is_resolved(&self) -> bool {
		matches!(self.state(), VNodeState::Attached | VNodeState::Direct)
	}

	#[must_use]
	pub fn target(&self) -> Option<HostRef> {
		self.target.borrow().clone()
	}

	#[must_use]
	pub fn parent(&self) -> Option<Rc<VNode>> {
		self.parent.borrow().upgrade()
	}

	#[must_use]
	pub fn children(&self) -> Vec<Rc<VNode>> {
		self.children.borrow().clone()
	}

	#[must_use]
	pub fn data(&self, key: &str) -> Option<String> {
		self.data.borrow().get(key).cloned()
	}

	pub fn set_data(&self, key: &str, value: &str) {
		self.data.borrow_mut().insert(key.to_owned(), value.to_owned());
	}

	pub fn remove_data(&self, key: &str) -> Option<String> {
		self.data.borrow_mut().remove(key)
	}

	/// The undo log for mutations mirrored onto this node's target, created on first use.
	pub fn restorable(&self) -> Rc<Restorable> {
		self.restorable.get_or_init(|| Rc::new(Restorable::new())).clone()
	}

	/// Replays the undo log, if there is one.
	pub fn restore(&self) {
		if let Some(restorable) = self.restorable.get() {
			restorable.restore();
		}
	}

	/// Returns `true` exactly once.
	pub fn take_reconcile(&self) -> bool {
		!self.reconciled.replace(true)
	}

	/// Returns `true` exactly once.
	pub fn take_clean_slate(&self) -> bool {
		!self.clean_slate.replace(true)
	}

	/// Runs `op` against the target, or defers it until one is resolved.
	pub fn dispatch(&self, op: impl FnOnce(&HostRef) + 'static) {
		if let Some(target) = self.target() {
			return op(&target);
		}
		match self.pending.borrow_mut().as_mut() {
			Some(pending) => pending.push_back(Box::new(op)),
			None => warn!(state = ?self.state(), "Dropped operation dispatched to a node that can no longer resolve."),
		}
	}

	/// Merges this node onto the pre-existing `target`.
	pub fn attach(&self, target: HostRef) {
		self.resolve(VNodeState::Attached, target)
	}

	/// Makes this node its own target.
	pub fn target_self(&self) {
		self.resolve(VNodeState::Direct, self.host.clone())
	}

	fn resolve(&self, state: VNodeState, target: HostRef) {
		if self.state() != VNodeState::Pending {
			return warn!(from = ?self.state(), to = ?state, "Tried to resolve a node that isn't pending.");
		}
		trace!(?state, same = target.same(&self.host), "Resolved.");
		self.state.set(state);
		*self.target.borrow_mut() = Some(target.clone());
		let pending = self.pending.borrow_mut().take().unwrap_or_default();
		for op in pending {
			op(&target);
		}
	}

	/// Clears target and deferred operations. Terminal.
	pub fn detach(&self) {
		self.state.set(VNodeState::Detached);
		self.target.borrow_mut().take();
		self.pending.borrow_mut().take();
	}

	/// Appends `child`, first unlinking it from its previous parent.
	pub fn append_child(self: &Rc<Self>, child: &Rc<VNode>) {
		self.insert_before(child, None)
	}

	/// Inserts `child` before `reference`, or appends it if `reference` isn't a child of `self`.
	pub fn insert_before(self: &Rc<Self>, child: &Rc<VNode>, reference: Option<&Rc<VNode>>) {
		if let Some(previous) = child.parent() {
			previous.unlink(child);
		}
		let mut children = self.children.borrow_mut();
		let index = reference
			.and_then(|reference| children.iter().position(|sibling| Rc::ptr_eq(sibling, reference)))
			.unwrap_or(children.len());
		children.insert(index, child.clone());
		*child.parent.borrow_mut() = Rc::downgrade(self);
	}

	/// Returns whether `child` was a child of `self`.
	pub fn remove_child(&self, child: &Rc<VNode>) -> bool {
		match child.parent() {
			Some(parent) if core::ptr::eq(Rc::as_ptr(&parent), self) => {
				self.unlink(child);
				true
			}
			_ => false,
		}
	}

	fn unlink(&self, child: &Rc<VNode>) {
		self.children.borrow_mut().retain(|sibling| !Rc::ptr_eq(sibling, child));
		*child.parent.borrow_mut() = Weak::new();
	}
}
impl Debug for VNode {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("VNode")
			.field("host", &self.host)
			.field("state", &self.state())
			.field("children", &self.children.borrow().len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::{VNode, VNodeState};
	use crate::{
		host::{HostExt, HostRef},
		memory::Node,
	};
	use core::cell::RefCell;
	use std::rc::Rc;

	#[test]
	fn deferred_operations_run_in_order() {
		let document = Node::new_document();
		let vnode = VNode::new(document.create_element("span"));
		let target: HostRef = document.create_element("span");
		let log = Rc::new(RefCell::new(Vec::new()));

		for i in 0..3 {
			let log = log.clone();
			vnode.dispatch(move |_| log.borrow_mut().push(i));
		}
		assert!(log.borrow().is_empty());

		vnode.attach(target.clone());
		assert_eq!(*log.borrow(), [0, 1, 2]);
		assert_eq!(vnode.state(), VNodeState::Attached);

		let seen = Rc::new(RefCell::new(None));
		vnode.dispatch({
			let seen = seen.clone();
			move |target| *seen.borrow_mut() = Some(target.clone())
		});
		assert!(seen.borrow().as_ref().unwrap().same(&target));
	}

	#[test]
	fn detached_is_terminal() {
		let document = Node::new_document();
		let vnode = VNode::new(document.create_element("p"));
		vnode.detach();
		vnode.target_self();
		assert_eq!(vnode.state(), VNodeState::Detached);
		assert!(vnode.target().is_none());

		let ran = Rc::new(RefCell::new(false));
		vnode.dispatch({
			let ran = ran.clone();
			move |_| *ran.borrow_mut() = true
		});
		assert!(!*ran.borrow());
	}

	#[test]
	fn resolves_only_once() {
		let document = Node::new_document();
		let vnode = VNode::new(document.create_element("p"));
		vnode.target_self();
		vnode.attach(document.create_element("p"));
		assert_eq!(vnode.state(), VNodeState::Direct);
		assert!(vnode.target().unwrap().same(vnode.host()));
	}

	#[test]
	fn membership_is_exclusive() {
		let document = Node::new_document();
		let a = VNode::new(document.create_element("a"));
		let b = VNode::new(document.create_element("b"));
		let first = VNode::new(document.create_text_node("1"));
		let second = VNode::new(document.create_text_node("2"));

		a.append_child(&second);
		a.insert_before(&first, Some(&second));
		assert_eq!(a.children().len(), 2);
		assert!(Rc::ptr_eq(&a.children()[0], &first));

		b.append_child(&first);
		assert_eq!(a.children().len(), 1);
		assert!(Rc::ptr_eq(&first.parent().unwrap(), &b));

		assert!(!a.remove_child(&first));
		assert!(b.remove_child(&first));
		assert!(first.parent().is_none());
		assert!(b.children().is_empty());
	}
}

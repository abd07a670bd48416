#![doc(html_root_url = "https://docs.rs/dom-blend/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Blends the output of a DOM-emitting renderer into a live DOM tree it doesn't own.
//!
//! The renderer mounts into the root returned by [`blend_root`] (or gets it passed by [`blend`]).
//! Each element it creates is matched against the existing tree by selector:
//! Matches receive the renderer's mutations, anything else is inserted as-is.
//! Removing a generated node undoes what it did to the host tree.
//!
//! Host trees are accessed through [`HostObject`], which is implemented for browser values in [`web`] and by the in-memory DOM in [`memory`].

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod attach;
pub mod blend;
pub mod component;
pub mod host;
pub mod memory;
pub mod once;
pub mod proxy;
mod rc_hash_map;
pub mod restore;
pub mod trace;
pub mod vnode;
pub mod web;

pub use blend::{blend, blend_root, vnode_of, BlendError, BlendOptions};
pub use host::{Callback, HostError, HostExt, HostObject, HostRef, Value};

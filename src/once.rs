use core::{cell::RefCell, hash::Hash};
use hashbrown::HashMap;

/// Runs a computation at most once per key and hands out the stored result afterwards.
///
/// The computation may re-enter the same [`Once`] with other keys.
#[derive(Debug)]
pub struct Once<K, V> {
	memo: RefCell<HashMap<K, V>>,
}
impl<K: Hash + Eq, V: Clone> Default for Once<K, V> {
	fn default() -> Self {
		Self::new()
	}
}
impl<K: Hash + Eq, V: Clone> Once<K, V> {
	#[must_use]
	pub fn new() -> Self {
		Self { memo: RefCell::new(HashMap::new()) }
	}

	pub fn once(&self, key: K, compute: impl FnOnce() -> V) -> V {
		if let Some(value) = self.memo.borrow().get(&key) {
			return value.clone();
		}
		let value = compute();
		self.memo.borrow_mut().entry(key).or_insert(value).clone()
	}

	pub fn contains(&self, key: &K) -> bool {
		self.memo.borrow().contains_key(key)
	}

	pub fn clear(&self) {
		self.memo.borrow_mut().clear()
	}
}

#[cfg(test)]
mod tests {
	use super::Once;
	use core::cell::Cell;

	#[test]
	fn computes_once_per_key() {
		let once = Once::new();
		let runs = Cell::new(0);
		let compute = || {
			runs.set(runs.get() + 1);
			runs.get()
		};
		assert_eq!(once.once("a", compute), 1);
		assert_eq!(once.once("a", || unreachable!()), 1);
		assert_eq!(once.once("b", || 7), 7);
		assert!(once.contains(&"a"));
		once.clear();
		assert!(!once.contains(&"a"));
	}

	#[test]
	fn reentrant_with_other_keys() {
		let once = Once::new();
		let outer = once.once(1, || once.once(2, || 5) + 1);
		assert_eq!(outer, 6);
		assert_eq!(once.once(2, || unreachable!()), 5);
	}
}

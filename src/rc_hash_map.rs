use core::{
	borrow::Borrow,
	hash::{BuildHasher, Hash},
};
use hashbrown::{
	hash_map::{DefaultHashBuilder, Entry, ExtractIf},
	HashMap,
};
use num_traits::{CheckedAdd, CheckedSub, One, Zero};
use thiserror::Error;

/// A map with a reference count per entry. Entries whose count drops to zero stay until [`RcHashMap::drain_weak`].
pub struct RcHashMap<K, C, V, S = DefaultHashBuilder>(HashMap<K, (C, V), S>)
where
	K: Hash + Eq,
	C: CheckedAdd + CheckedSub + One + Zero,
	S: BuildHasher;
impl<K, C, V, S> Default for RcHashMap<K, C, V, S>
where
	K: Hash + Eq,
	C: CheckedAdd + CheckedSub + One + Zero,
	S: Default + BuildHasher,
{
	fn default() -> Self {
		Self::new()
	}
}
impl<K, C, V, S> RcHashMap<K, C, V, S>
where
	K: Hash + Eq,
	C: CheckedAdd + CheckedSub + One + Zero,
	S: BuildHasher,
{
	#[must_use]
	pub fn new() -> Self
	where
		S: Default,
	{
		Self(HashMap::with_hasher(S::default()))
	}

	/// Looks up `k` without touching its count.
	pub fn get<Q: ?Sized>(&self, k: &Q) -> Option<&V>
	where
		K: Borrow<Q>,
		Q: Eq + Hash,
	{
		self.0.get(k).map(|(_, v)| v)
	}

	pub fn increment_or_insert_with<F: FnOnce() -> V>(&mut self, k: K, v: F) -> Result<&mut V, CountSaturatedError> {
		match self.0.entry(k) {
			Entry::Occupied(occupied) => {
				let (c, v) = occupied.into_mut();
				*c = c.checked_add(&C::one()).ok_or(CountSaturatedError)?;
				Ok(v)
			}
			Entry::Vacant(vacant) => {
				let (_, v) = vacant.insert((C::one(), v()));
				Ok(v)
			}
		}
	}

	pub fn weak_decrement<Q: ?Sized>(&mut self, k: &Q) -> Result<Option<&mut V>, CountSaturatedError>
	where
		K: Borrow<Q>,
		Q: Eq + Hash,
	{
		match self.0.get_mut(k) {
			Some((c, v)) => {
				*c = c.checked_sub(&C::one()).ok_or(CountSaturatedError)?;
				Ok(Some(v))
			}
			None => Ok(None),
		}
	}

	/// Removes and yields all entries with a count of zero.
	pub fn drain_weak(&mut self) -> DrainWeak<'_, K, C, V> {
		DrainWeak(self.0.extract_if(DrainWeak::weak_filter as fn(&K, &mut (C, V)) -> bool))
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

pub struct DrainWeak<'a, K, C, V>(ExtractIf<'a, K, (C, V), fn(&K, &mut (C, V)) -> bool>);
impl<'a, K, C, V> DrainWeak<'a, K, C, V>
where
	C: Zero,
{
	fn weak_filter(_: &K, (c, _): &mut (C, V)) -> bool {
		c.is_zero()
	}
}
impl<'a, K, C, V> Iterator for DrainWeak<'a, K, C, V> {
	type Item = (K, V);

	fn next(&mut self) -> Option<Self::Item> {
		self.0.next().map(|(k, (_, v))| (k, v))
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		self.0.size_hint()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("reference count saturated")]
pub struct CountSaturatedError;

#[cfg(test)]
mod tests {
	use super::{CountSaturatedError, RcHashMap};

	#[test]
	fn counts_and_drains() {
		let mut map = RcHashMap::<&str, u8, u32>::new();
		*map.increment_or_insert_with("a", || 1).unwrap() += 10;
		assert_eq!(map.increment_or_insert_with("a", || 99), Ok(&mut 11));
		map.increment_or_insert_with("b", || 2).unwrap();

		map.weak_decrement("a").unwrap();
		map.weak_decrement("b").unwrap();
		assert_eq!(map.drain_weak().collect::<Vec<_>>(), [("b", 2)]);
		assert_eq!(map.get("a"), Some(&11));

		map.weak_decrement("a").unwrap();
		assert_eq!(map.weak_decrement("a"), Err(CountSaturatedError));
		assert_eq!(map.drain_weak().count(), 1);
		assert!(map.is_empty());
	}
}

//! Safe deserialization with bounded collections.
//!
//! The bounds are enforced inside the serde visitors, so an oversized
//! collection is rejected while decoding, before it is ever allocated in
//! full.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Envelopes per `Send` frame. Matches the ingress buffer capacity: a
/// single flush can never exceed it.
pub const MAX_BATCH_ENVELOPES: usize = 10_000;

/// Sources per meta response.
pub const MAX_META_SOURCES: usize = 100_000;

/// Nodes per range assignment.
pub const MAX_NODES: usize = 1_024;

/// Ranges granted to one node in one assignment.
pub const MAX_RANGES_PER_NODE: usize = 4_096;

/// A `Vec` that refuses to deserialize past `N` elements.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedVec<T, const N: usize>(Vec<T>);

impl<T, const N: usize> BoundedVec<T, N> {
    pub fn new(v: Vec<T>) -> Option<Self> {
        if v.len() <= N { Some(Self(v)) } else { None }
    }

    pub fn into_inner(self) -> Vec<T> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T, const N: usize> Default for BoundedVec<T, N> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T, const N: usize> From<BoundedVec<T, N>> for Vec<T> {
    fn from(bv: BoundedVec<T, N>) -> Self {
        bv.0
    }
}

impl<T, const N: usize> std::ops::Deref for BoundedVec<T, N> {
    type Target = [T];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T, const N: usize> IntoIterator for BoundedVec<T, N> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, T, const N: usize> IntoIterator for &'a BoundedVec<T, N> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<T: Serialize, const N: usize> Serialize for BoundedVec<T, N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>, const N: usize> Deserialize<'de> for BoundedVec<T, N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SeqVisitor<T, const N: usize>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>, const N: usize> de::Visitor<'de> for SeqVisitor<T, N> {
            type Value = BoundedVec<T, N>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a sequence with at most {} elements", N)
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let size_hint = seq.size_hint().unwrap_or(0);
                if size_hint > N {
                    return Err(de::Error::invalid_length(size_hint, &self));
                }

                let mut vec = Vec::with_capacity(size_hint.min(N));
                while let Some(elem) = seq.next_element()? {
                    if vec.len() >= N {
                        return Err(de::Error::invalid_length(vec.len() + 1, &self));
                    }
                    vec.push(elem);
                }
                Ok(BoundedVec(vec))
            }
        }

        deserializer.deserialize_seq(SeqVisitor(PhantomData))
    }
}

/// A `HashMap` that refuses to deserialize past `N` entries.
#[derive(Debug, Clone)]
pub struct BoundedMap<K, V, const N: usize>(HashMap<K, V>);

impl<K: Eq + Hash, V: PartialEq, const N: usize> PartialEq for BoundedMap<K, V, N> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<K: Eq + Hash, V, const N: usize> BoundedMap<K, V, N> {
    pub fn new(map: HashMap<K, V>) -> Option<Self> {
        if map.len() <= N { Some(Self(map)) } else { None }
    }

    pub fn into_inner(self) -> HashMap<K, V> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::collections::hash_map::Iter<'_, K, V> {
        self.0.iter()
    }
}

impl<K, V, const N: usize> Default for BoundedMap<K, V, N> {
    fn default() -> Self {
        Self(HashMap::new())
    }
}

impl<K, V, const N: usize> From<BoundedMap<K, V, N>> for HashMap<K, V> {
    fn from(bm: BoundedMap<K, V, N>) -> Self {
        bm.0
    }
}

impl<K: Serialize, V: Serialize, const N: usize> Serialize for BoundedMap<K, V, N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, K, V, const N: usize> Deserialize<'de> for BoundedMap<K, V, N>
where
    K: Deserialize<'de> + Eq + Hash,
    V: Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MapVisitor<K, V, const N: usize>(PhantomData<(K, V)>);

        impl<'de, K, V, const N: usize> de::Visitor<'de> for MapVisitor<K, V, N>
        where
            K: Deserialize<'de> + Eq + Hash,
            V: Deserialize<'de>,
        {
            type Value = BoundedMap<K, V, N>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a map with at most {} entries", N)
            }

            fn visit_map<A: de::MapAccess<'de>>(
                self,
                mut access: A,
            ) -> Result<Self::Value, A::Error> {
                let size_hint = access.size_hint().unwrap_or(0);
                if size_hint > N {
                    return Err(de::Error::invalid_length(size_hint, &self));
                }

                let mut map = HashMap::with_capacity(size_hint.min(N));
                while let Some((key, value)) = access.next_entry()? {
                    if map.len() >= N {
                        return Err(de::Error::invalid_length(map.len() + 1, &self));
                    }
                    map.insert(key, value);
                }
                Ok(BoundedMap(map))
            }
        }

        deserializer.deserialize_map(MapVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_vec_rejects_oversized_construction() {
        assert!(BoundedVec::<u8, 3>::new(vec![1, 2, 3]).is_some());
        assert!(BoundedVec::<u8, 3>::new(vec![1, 2, 3, 4]).is_none());
    }

    #[test]
    fn bounded_vec_rejects_oversized_wire_data() {
        let long: Vec<u32> = (0..10).collect();
        let bytes = postcard::to_allocvec(&long).unwrap();

        assert!(postcard::from_bytes::<BoundedVec<u32, 5>>(&bytes).is_err());
        let ok: BoundedVec<u32, 10> = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(ok.len(), 10);
    }

    #[test]
    fn bounded_map_rejects_oversized_wire_data() {
        let map: HashMap<u32, u32> = (0..10).map(|i| (i, i)).collect();
        let bytes = postcard::to_allocvec(&map).unwrap();

        assert!(postcard::from_bytes::<BoundedMap<u32, u32, 5>>(&bytes).is_err());
        let ok: BoundedMap<u32, u32, 10> = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(ok.len(), 10);
    }
}

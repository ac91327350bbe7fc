//! Generation-tagged table of live fences.
//!
//! A [`FenceHandle`] stays valid only as long as the slot it names holds the
//! same generation. Deferred work and the input hooks keep handles instead of
//! references and resolve them at the point of use.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FenceHandle {
    index: u32,
    generation: u32,
}

impl FenceHandle {
    /// Split into two words for round-tripping through a window message.
    pub fn to_parts(self) -> (u32, u32) {
        (self.index, self.generation)
    }

    pub fn from_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

#[derive(Debug)]
pub struct Registry<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self { slots: Vec::new(), free: Vec::new(), live: 0 }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn insert(&mut self, value: T) -> FenceHandle {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return FenceHandle { index, generation: slot.generation };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, value: Some(value) });
        FenceHandle { index, generation: 0 }
    }

    /// Remove and return the value; every outstanding handle to it goes stale.
    pub fn remove(&mut self, handle: FenceHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        Some(value)
    }

    pub fn contains(&self, handle: FenceHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn get(&self, handle: FenceHandle) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: FenceHandle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Mutable access to two distinct entries at once.
    pub fn get_pair_mut(&mut self, a: FenceHandle, b: FenceHandle) -> Option<(&mut T, &mut T)> {
        if a.index == b.index || !self.contains(a) || !self.contains(b) {
            return None;
        }
        let (lo, hi, swapped) = if a.index < b.index { (a, b, false) } else { (b, a, true) };
        let (head, tail) = self.slots.split_at_mut(hi.index as usize);
        let first = head[lo.index as usize].value.as_mut()?;
        let second = tail[0].value.as_mut()?;
        Some(if swapped { (second, first) } else { (first, second) })
    }

    pub fn iter(&self) -> impl Iterator<Item = (FenceHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value
                .as_ref()
                .map(|v| (FenceHandle { index: i as u32, generation: slot.generation }, v))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (FenceHandle, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|v| (FenceHandle { index: i as u32, generation }, v))
        })
    }

    pub fn handles(&self) -> Vec<FenceHandle> {
        self.iter().map(|(h, _)| h).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_handle_goes_stale() {
        let mut reg = Registry::new();
        let a = reg.insert("a");
        assert_eq!(reg.get(a), Some(&"a"));
        assert_eq!(reg.remove(a), Some("a"));
        assert!(!reg.contains(a));
        assert_eq!(reg.remove(a), None);

        // slot reuse must not revive the old handle
        let b = reg.insert("b");
        assert_ne!(a, b);
        assert_eq!(reg.get(a), None);
        assert_eq!(reg.get(b), Some(&"b"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_pair_access() {
        let mut reg = Registry::new();
        let a = reg.insert(1);
        let b = reg.insert(2);
        let (x, y) = reg.get_pair_mut(b, a).unwrap();
        assert_eq!((*x, *y), (2, 1));
        *x += 10;
        assert_eq!(reg.get(b), Some(&12));
        assert!(reg.get_pair_mut(a, a).is_none());
    }

    #[test]
    fn test_parts_round_trip() {
        let mut reg = Registry::new();
        let a = reg.insert(());
        reg.remove(a);
        let b = reg.insert(());
        let (index, generation) = b.to_parts();
        assert_eq!(generation, 1);
        assert_eq!(FenceHandle::from_parts(index, generation), b);
    }

    #[test]
    fn test_iter_skips_free_slots() {
        let mut reg = Registry::new();
        let a = reg.insert('a');
        let _b = reg.insert('b');
        reg.remove(a);
        let values: Vec<char> = reg.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec!['b']);
    }
}

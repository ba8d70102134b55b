use std::collections::VecDeque;

use crate::error::RingError;

/// A single contiguous span of the ring's virtual address space, either backing a live
/// allocation or left behind as a filler (the unusable tail of the buffer skipped over when an
/// allocation wraps around to the front).
#[derive(Debug, Clone, Copy)]
struct Node {
    id: u64,
    start: u64,
    end: u64,
    empty: bool,
}

/// Unbacked virtual ring allocator over a power-of-two byte space.
///
/// The ring tracks occupancy only; it has no storage of its own. [StagingPool](crate::staging::StagingPool)
/// pairs one of these with a single device buffer. `head` and `tail` are monotonically
/// increasing *virtual* offsets; `head - tail` is always the number of bytes currently
/// outstanding, which is what makes the classic head==tail (empty) vs. head-tail==capacity
/// (full) ambiguity resolvable without a separate "is full" flag.
pub struct RingAllocator {
    capacity: u64,
    head: u64,
    tail: u64,
    nodes: VecDeque<Node>,
    next_id: u64,
}

/// A single allocation returned by [RingAllocator::allocate]. `addr` is the *physical* offset
/// (`virtual & (capacity - 1)`) the caller should use to address the backing buffer, and is what
/// must be passed back into [RingAllocator::free].
#[derive(Debug, Clone, Copy)]
pub struct RingAllocation {
    pub addr: u64,
    pub size: u64,
}

impl RingAllocator {
    const ALIGN: u64 = 8;

    pub fn new(capacity: u64) -> Result<Self, RingError> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(RingError::InvalidArgument(capacity));
        }

        Ok(RingAllocator {
            capacity,
            head: 0,
            tail: 0,
            nodes: VecDeque::new(),
            next_id: 0,
        })
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn phys(&self, virt: u64) -> u64 {
        virt & (self.capacity - 1)
    }

    /// Rounds `virt` up to the next multiple of the ring's capacity. Used both to skip the
    /// unusable gap at end-of-buffer when an allocation must wrap, and to re-anchor `head`/`tail`
    /// to a clean boundary once the ring has fully drained.
    fn next_wrap_boundary(&self, virt: u64) -> u64 {
        (virt + self.capacity - 1) & !(self.capacity - 1)
    }

    fn round_up_align(size: u64) -> u64 {
        (size + (Self::ALIGN - 1)) & !(Self::ALIGN - 1)
    }

    /// Allocates `size` bytes, returning the physical offset to write/read at. Fails with
    /// [RingError::OutOfMemory] if no contiguous run of free space is large enough right now, even
    /// if the total free space across the ring would suffice.
    pub fn allocate(&mut self, size: u64) -> Result<RingAllocation, RingError> {
        if size == 0 {
            return Err(RingError::InvalidArgument(size));
        }
        let size = Self::round_up_align(size);
        if size > self.capacity {
            return Err(RingError::OutOfMemory);
        }

        if self.head - self.tail == self.capacity {
            return Err(RingError::OutOfMemory);
        }

        let phys_head = self.phys(self.head);
        let phys_tail = self.phys(self.tail);

        let alloc_start = if phys_head < phys_tail {
            // head has already wrapped ahead of tail physically; the only free run is the gap
            // between them.
            if phys_tail - phys_head >= size {
                let start = self.head;
                self.head += size;
                start
            } else {
                return Err(RingError::OutOfMemory);
            }
        } else if size <= self.capacity - phys_head {
            // room to place at head without touching the end of the buffer.
            let start = self.head;
            self.head += size;
            start
        } else if phys_tail >= size {
            // not enough room before end-of-buffer, but the wrapped-around region (from offset 0
            // up to tail) fits. Leave a filler node over the unusable gap and wrap.
            let wrap_boundary = self.next_wrap_boundary(self.head);
            if wrap_boundary > self.head {
                self.push_node(self.head, wrap_boundary, true);
            }
            let start = wrap_boundary;
            self.head = wrap_boundary + size;
            start
        } else {
            return Err(RingError::OutOfMemory);
        };

        let id = self.next_id;
        self.next_id += 1;
        self.nodes.push_back(Node {
            id,
            start: alloc_start,
            end: alloc_start + size,
            empty: false,
        });

        Ok(RingAllocation {
            addr: self.phys(alloc_start),
            size,
        })
    }

    fn push_node(&mut self, start: u64, end: u64, empty: bool) {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.push_back(Node {
            id,
            start,
            end,
            empty,
        });
    }

    /// Frees the allocation at physical address `addr`. Reclaims from the tail: if the freed node
    /// is (or becomes, after earlier frees) the oldest live node, advances `tail` over it and any
    /// contiguous empty nodes that follow. If the ring drains completely, `head`/`tail` collapse
    /// back onto a wrap boundary so that a fresh full-capacity allocation becomes possible again.
    pub fn free(&mut self, addr: u64) -> Result<(), RingError> {
        let node_idx = self
            .nodes
            .iter()
            .position(|n| !n.empty && self.phys(n.start) == addr)
            .ok_or(RingError::InvalidAddress(addr))?;

        self.nodes[node_idx].empty = true;

        // Only the tail-most node can actually shrink the ring; a non-tail free just waits.
        while let Some(front) = self.nodes.front() {
            if front.empty {
                self.tail = front.end;
                self.nodes.pop_front();
            } else {
                break;
            }
        }

        if self.nodes.is_empty() {
            let boundary = self.next_wrap_boundary(self.head);
            self.head = boundary;
            self.tail = boundary;
        }

        Ok(())
    }

    /// True once every outstanding allocation has been freed.
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_power_of_two() {
        assert!(matches!(
            RingAllocator::new(100),
            Err(RingError::InvalidArgument(100))
        ));
    }

    #[test]
    fn simple_allocate_free_roundtrip() {
        let mut ring = RingAllocator::new(128).unwrap();
        let a = ring.allocate(48).unwrap();
        assert_eq!(a.addr, 0);
        ring.free(a.addr).unwrap();
        assert!(ring.is_empty());
        // full capacity allocation must succeed again.
        let b = ring.allocate(128).unwrap();
        assert_eq!(b.addr, 0);
    }

    #[test]
    fn allocations_never_overlap() {
        let mut ring = RingAllocator::new(256).unwrap();
        let a = ring.allocate(64).unwrap();
        let b = ring.allocate(64).unwrap();
        assert!(a.addr + a.size <= b.addr || b.addr + b.size <= a.addr);
    }

    #[test]
    fn allocated_addresses_are_eight_byte_aligned() {
        let mut ring = RingAllocator::new(256).unwrap();
        for size in [1, 3, 7, 9, 33] {
            let a = ring.allocate(size).unwrap();
            assert_eq!(a.addr % 8, 0);
        }
    }

    #[test]
    fn wrap_around_uses_filler_node() {
        // Pool size 128 bytes. Allocate 48, allocate 48, free the first, allocate 48.
        let mut ring = RingAllocator::new(128).unwrap();
        let first = ring.allocate(48).unwrap();
        assert_eq!(first.addr, 0);
        let second = ring.allocate(48).unwrap();
        assert_eq!(second.addr, 48);

        ring.free(first.addr).unwrap();

        // not enough contiguous room at the head (only 32 bytes before end-of-buffer), but the
        // wrapped region at offset 0 fits after the gap is filled.
        let third = ring.allocate(48).unwrap();
        assert_eq!(third.addr, 0);

        ring.free(second.addr).unwrap();
        ring.free(third.addr).unwrap();
        assert!(ring.is_empty());
    }

    #[test]
    fn full_ring_rejects_further_allocation() {
        let mut ring = RingAllocator::new(64).unwrap();
        let _a = ring.allocate(64).unwrap();
        assert!(matches!(ring.allocate(8), Err(RingError::OutOfMemory)));
    }

    #[test]
    fn free_of_unknown_address_fails() {
        let mut ring = RingAllocator::new(64).unwrap();
        assert!(matches!(
            ring.free(16),
            Err(RingError::InvalidAddress(16))
        ));
    }

    #[test]
    fn interleaved_allocate_free_never_corrupts() {
        let mut ring = RingAllocator::new(512).unwrap();
        let mut outstanding: Vec<RingAllocation> = Vec::new();
        let sizes = [32u64, 16, 64, 8, 128, 32, 64, 16, 32];
        for (i, &size) in sizes.iter().cycle().take(40).enumerate() {
            if i % 3 == 2 && !outstanding.is_empty() {
                let a = outstanding.remove(0);
                ring.free(a.addr).unwrap();
            } else if let Ok(a) = ring.allocate(size) {
                for existing in &outstanding {
                    let overlap = a.addr < existing.addr + existing.size
                        && existing.addr < a.addr + a.size;
                    assert!(!overlap, "allocation overlap detected");
                }
                outstanding.push(a);
            }
        }
        for a in outstanding {
            ring.free(a.addr).unwrap();
        }
        assert!(ring.is_empty());
    }
}

//! Kernel heap: a fixed static region handed to `linked_list_allocator`.
//! Grounded on the teacher's `heap.rs`, trimmed to the allocator/init pair
//! this kernel needs (no buddy-page large-allocation fallback, no AI
//! tensor helpers — this kernel has no page allocator to fall back to).

use core::alloc::Layout;
use linked_list_allocator::LockedHeap;

const HEAP_SIZE: usize = 4 * 1024 * 1024;

#[repr(align(4096))]
struct HeapRegion([u8; HEAP_SIZE]);

static mut HEAP_REGION: HeapRegion = HeapRegion([0; HEAP_SIZE]);

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Hands the static heap region to the allocator. Must run once, after
/// `gdt`/`idt` are up and before anything calls into `alloc`.
pub fn init() {
    unsafe {
        let start = core::ptr::addr_of_mut!(HEAP_REGION.0) as *mut u8;
        ALLOCATOR.lock().init(start, HEAP_SIZE);
    }
}

#[alloc_error_handler]
fn alloc_error_handler(layout: Layout) -> ! {
    panic!("heap allocation failed: {} bytes, align {}", layout.size(), layout.align());
}

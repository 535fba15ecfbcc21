//! Pages and bump-allocated spaces

use std::alloc::{self, Layout};
use std::cell::Cell;
use std::ptr::NonNull;

use crate::error::{HeapError, HeapResult};
use crate::layout;

/// Alignment of every page mapping
pub const PAGE_ALIGN: usize = 4096;

/// A fixed-size, page-aligned block of zeroed memory
pub struct Page {
    start: NonNull<u8>,
    layout: Layout,
    /// Next free address inside this page
    top: usize,
}

impl Page {
    /// Map a new page of `size` bytes
    pub fn new(size: usize) -> HeapResult<Self> {
        let layout = Layout::from_size_align(size.max(PAGE_ALIGN), PAGE_ALIGN)
            .map_err(|_| HeapError::InvalidLayout { size })?;
        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let start = NonNull::new(raw).ok_or(HeapError::PageAllocation { size })?;
        Ok(Self {
            start,
            layout,
            top: start.as_ptr() as usize,
        })
    }

    /// First address of the page
    #[inline]
    pub fn start(&self) -> usize {
        self.start.as_ptr() as usize
    }

    /// One past the last address of the page
    #[inline]
    pub fn end(&self) -> usize {
        self.start() + self.layout.size()
    }

    /// Bytes still available
    #[inline]
    pub fn remaining(&self) -> usize {
        self.end() - self.top
    }

    /// Page size in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Whether `addr` lies inside this page
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.start() && addr < self.end()
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        // SAFETY: `start` was returned by `alloc_zeroed` with `layout`.
        unsafe { alloc::dealloc(self.start.as_ptr(), self.layout) }
    }
}

/// Allocation cursor of the current page.
///
/// Lives at a stable address so generated code can bump `top` without
/// calling back into the host.
#[repr(C)]
#[derive(Debug, Default)]
pub struct SpaceCursor {
    /// Next free address
    pub top: Cell<usize>,
    /// End of the current page
    pub limit: Cell<usize>,
}

impl SpaceCursor {
    /// Byte offset of `top`
    pub const TOP: i32 = 0;
    /// Byte offset of `limit`
    pub const LIMIT: i32 = 8;
}

/// A bump-pointer arena made of pages
pub struct Space {
    name: &'static str,
    pages: Vec<Page>,
    current: Option<usize>,
    cursor: Box<SpaceCursor>,
    page_size: usize,
    page_slack: usize,
}

impl Space {
    /// Create an empty space; pages are mapped lazily
    pub fn new(name: &'static str, page_size: usize, page_slack: usize) -> Self {
        Self {
            name,
            pages: Vec::new(),
            current: None,
            cursor: Box::default(),
            page_size,
            page_slack,
        }
    }

    /// Space name used in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Allocate `size` bytes, rounded up to the heap alignment
    pub fn allocate(&mut self, size: usize) -> HeapResult<NonNull<u8>> {
        let size = layout::align(size);
        let top = self.cursor.top.get();
        if self.current.is_none() || top + size > self.cursor.limit.get() {
            self.switch_page(size)?;
        }

        let top = self.cursor.top.get();
        self.cursor.top.set(top + size);
        // SAFETY: `top` lies inside a live page, which is never null.
        Ok(unsafe { NonNull::new_unchecked(top as *mut u8) })
    }

    /// Make a page with at least `size` free bytes current
    fn switch_page(&mut self, size: usize) -> HeapResult<()> {
        self.sync_current();

        let reusable = self
            .pages
            .iter()
            .enumerate()
            .find(|(i, page)| Some(*i) != self.current && page.remaining() >= size)
            .map(|(i, _)| i);

        let index = match reusable {
            Some(index) => index,
            None => {
                let page_size = self.page_size.max(size + self.page_slack);
                let page = Page::new(page_size)?;
                tracing::debug!(space = self.name, size = page_size, "mapped page");
                self.pages.push(page);
                self.pages.len() - 1
            }
        };

        let page = &self.pages[index];
        self.cursor.top.set(page.top);
        self.cursor.limit.set(page.end());
        self.current = Some(index);
        Ok(())
    }

    /// Copy the cursor back into the current page
    fn sync_current(&mut self) {
        if let Some(index) = self.current {
            self.pages[index].top = self.cursor.top.get();
        }
    }

    /// Cursor address handed to generated code
    pub fn cursor(&self) -> *const SpaceCursor {
        &*self.cursor
    }

    /// Number of mapped pages
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Whether `addr` belongs to this space
    pub fn contains(&self, addr: usize) -> bool {
        self.pages.iter().any(|page| page.contains(addr))
    }

    /// Bytes handed out so far across all pages
    pub fn allocated_bytes(&self) -> usize {
        self.pages
            .iter()
            .enumerate()
            .map(|(i, page)| {
                let top = if Some(i) == self.current {
                    self.cursor.top.get()
                } else {
                    page.top
                };
                top - page.start()
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_aligned_and_distinct() {
        let mut space = Space::new("test", 64 * 1024, 1024);
        let a = space.allocate(123).expect("allocation should succeed");
        let b = space.allocate(8).expect("allocation should succeed");
        assert_eq!(a.as_ptr() as usize % 8, 0);
        assert_eq!(b.as_ptr() as usize - a.as_ptr() as usize, 128);
        assert_eq!(space.page_count(), 1);
    }

    #[test]
    fn cursor_tracks_current_page() {
        let mut space = Space::new("test", 64 * 1024, 1024);
        let a = space.allocate(16).expect("allocation should succeed");
        // SAFETY: the cursor lives as long as the space.
        let cursor = unsafe { &*space.cursor() };
        assert_eq!(cursor.top.get(), a.as_ptr() as usize + 16);
        assert!(cursor.limit.get() >= cursor.top.get());
    }

    #[test]
    fn oversized_request_maps_fitting_page() {
        let mut space = Space::new("test", 4096, 1024);
        let big = space.allocate(10_000).expect("allocation should succeed");
        assert!(space.contains(big.as_ptr() as usize));
        assert_eq!(space.page_count(), 1);
    }
}

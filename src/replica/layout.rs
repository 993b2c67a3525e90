//! Host-page layout adjustment with exactly one live snapshot.
//!
//! The snapshot exists iff the layout is adjusted, so a double adjust or a
//! double restore is structurally impossible.

use super::page::{LayoutSnapshot, PageHost};

#[derive(Debug, Clone, Default)]
pub struct LayoutGuard {
    original: Option<LayoutSnapshot>,
}

impl LayoutGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_adjusted(&self) -> bool {
        self.original.is_some()
    }

    pub fn original(&self) -> Option<&LayoutSnapshot> {
        self.original.as_ref()
    }

    /// Shift the page to make room for an overlay `width` pixels wide.
    /// Returns false when already adjusted.
    pub fn adjust<P: PageHost + ?Sized>(&mut self, page: &mut P, width: u32) -> bool {
        if self.original.is_some() {
            return false;
        }

        let original = page.read_layout();
        let shifted = LayoutSnapshot {
            margin_right: format!("{}px", width),
            ..original.clone()
        };
        page.write_layout(&shifted);
        self.original = Some(original);
        log::debug!("[REPLICA] Page layout adjusted for width {}", width);
        true
    }

    /// Put the page back exactly as it was before `adjust`.
    /// Returns false when there was nothing to restore.
    pub fn restore<P: PageHost + ?Sized>(&mut self, page: &mut P) -> bool {
        match self.original.take() {
            Some(original) => {
                page.write_layout(&original);
                log::debug!("[REPLICA] Page layout restored");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::page::MemoryPage;

    fn styled_page() -> MemoryPage {
        MemoryPage::with_layout(LayoutSnapshot {
            margin_right: "12px".into(),
            width: "90%".into(),
            max_width: "1200px".into(),
        })
    }

    #[test]
    fn adjust_then_restore_round_trips() {
        let mut page = styled_page();
        let before = page.read_layout();
        let mut guard = LayoutGuard::new();

        assert!(guard.adjust(&mut page, 400));
        assert_eq!(page.read_layout().margin_right, "400px");
        assert_eq!(page.read_layout().max_width, "1200px");

        assert!(guard.restore(&mut page));
        assert_eq!(page.read_layout(), before);
        assert!(!guard.is_adjusted());
    }

    #[test]
    fn double_adjust_keeps_first_snapshot() {
        let mut page = styled_page();
        let before = page.read_layout();
        let mut guard = LayoutGuard::new();

        guard.adjust(&mut page, 400);
        assert!(!guard.adjust(&mut page, 500));
        assert_eq!(page.read_layout().margin_right, "400px");

        guard.restore(&mut page);
        assert_eq!(page.read_layout(), before);
    }

    #[test]
    fn restore_without_adjust_touches_nothing() {
        let mut page = styled_page();
        let mut guard = LayoutGuard::new();
        assert!(!guard.restore(&mut page));
        assert_eq!(page.snapshot().layout_writes, 0);
    }
}

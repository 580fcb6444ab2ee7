//! Dispatch Frames
//!
//! Tracks which targets are currently delivering notifications on this
//! thread. A callback that mutates the target it is being notified about
//! runs inside that target's frame; the target uses [`DispatchFrame::is_active`]
//! to queue the resulting notification until the frame completes instead of
//! folding it into the walk in progress.
//!
//! # Implementation
//!
//! A thread-local stack of target ids. Entering pushes, the returned guard
//! pops on drop, so the stack stays balanced even if a callback panics.

use std::cell::RefCell;

use super::lifecycle::TargetId;

thread_local! {
    static FRAME_STACK: RefCell<Vec<TargetId>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the frame when dropped.
pub struct DispatchFrame {
    target: TargetId,
}

impl DispatchFrame {
    /// Enter a dispatch frame for `target`.
    pub fn enter(target: TargetId) -> Self {
        FRAME_STACK.with(|stack| stack.borrow_mut().push(target));
        Self { target }
    }

    /// Whether `target` is dispatching anywhere up the current call stack.
    pub fn is_active(target: TargetId) -> bool {
        FRAME_STACK.with(|stack| stack.borrow().contains(&target))
    }

    /// The innermost dispatching target, if any.
    pub fn current() -> Option<TargetId> {
        FRAME_STACK.with(|stack| stack.borrow().last().copied())
    }

    /// Number of nested frames on this thread.
    pub fn depth() -> usize {
        FRAME_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for DispatchFrame {
    fn drop(&mut self) {
        FRAME_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            debug_assert_eq!(
                popped,
                Some(self.target),
                "DispatchFrame mismatch: expected {:?}, got {:?}",
                self.target,
                popped
            );
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_tracks_target() {
        let id = TargetId::new();

        assert!(!DispatchFrame::is_active(id));
        assert!(DispatchFrame::current().is_none());

        {
            let _frame = DispatchFrame::enter(id);

            assert!(DispatchFrame::is_active(id));
            assert_eq!(DispatchFrame::current(), Some(id));
        }

        assert!(!DispatchFrame::is_active(id));
        assert_eq!(DispatchFrame::depth(), 0);
    }

    #[test]
    fn nested_frames() {
        let outer = TargetId::new();
        let inner = TargetId::new();

        {
            let _outer = DispatchFrame::enter(outer);
            {
                let _inner = DispatchFrame::enter(inner);
                assert_eq!(DispatchFrame::current(), Some(inner));
                // The outer target is still mid-dispatch.
                assert!(DispatchFrame::is_active(outer));
                assert_eq!(DispatchFrame::depth(), 2);
            }

            assert_eq!(DispatchFrame::current(), Some(outer));
            assert!(!DispatchFrame::is_active(inner));
        }

        assert!(DispatchFrame::current().is_none());
    }
}

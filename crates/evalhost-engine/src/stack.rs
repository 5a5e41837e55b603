//! The stack of in-flight evaluations and the cancellation state.
//!
//! The bottom entry stands for the top-level loop and is never popped. Above
//! it sit the running evaluation and every evaluation nested inside it, in
//! nesting order:
//!
//! ```text
//!   <top level> x y z
//! ```
//!
//! Canceling `y` also cancels `z`, since control cannot return to `y` until
//! `z` has unwound. Canceling the top level cancels everything.

/// Id of the bottom entry. A cancellation targeting it cancels everything.
pub const TOP_LEVEL: u64 = 0;

/// One in-flight evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalFrame {
    pub id: u64,
    pub cancelable: bool,
}

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The target is on the stack and is now being canceled.
    Started,
    /// A cancellation at or below the target is already in progress.
    Subsumed,
    /// The target is not on the stack; it has already completed.
    Stale,
}

/// Eval stack plus cancellation state. Both live behind one lock in the
/// engine.
#[derive(Debug, Clone)]
pub struct EvalStack {
    frames: Vec<EvalFrame>,
    cancel_target: Option<u64>,
}

impl EvalStack {
    pub fn new() -> Self {
        Self {
            frames: vec![EvalFrame {
                id: TOP_LEVEL,
                cancelable: true,
            }],
            cancel_target: None,
        }
    }

    pub fn push(&mut self, id: u64, cancelable: bool) {
        self.frames.push(EvalFrame { id, cancelable });
    }

    /// Pop the entry for `id`, which must be the innermost one.
    ///
    /// If `id` was the cancellation target, cancellation is complete. Returns
    /// false, and leaves the stack alone, if `id` is not on top or only the
    /// bottom entry is left.
    pub fn pop(&mut self, id: u64) -> bool {
        if self.frames.len() <= 1 {
            return false;
        }
        match self.frames.last() {
            Some(top) if top.id == id => {}
            top => {
                tracing::warn!(id, top = ?top, "Eval stack pop out of order");
                return false;
            }
        }
        self.frames.pop();
        if self.cancel_target == Some(id) {
            self.cancel_target = None;
        }
        true
    }

    /// Request cancellation of `target`.
    ///
    /// Walks from the bottom: a cancellation already targeting something
    /// below (or at) `target` subsumes the request.
    pub fn request_cancel(&mut self, target: u64) -> CancelOutcome {
        for frame in &self.frames {
            if self.cancel_target == Some(frame.id) {
                return CancelOutcome::Subsumed;
            }
            if frame.id == target {
                self.cancel_target = Some(target);
                return CancelOutcome::Started;
            }
        }
        CancelOutcome::Stale
    }

    /// Whether running code should unwind now: a cancellation is in progress
    /// and no entry anywhere on the stack is non-cancelable.
    pub fn query_interrupt(&self) -> bool {
        self.cancel_target.is_some() && self.frames.iter().all(|frame| frame.cancelable)
    }

    /// Finish a cancel-everything request once control is back at the top
    /// level, clearing any cancellation left over. Returns true if a
    /// cancel-everything request was in progress.
    pub fn finish_cancel_all(&mut self) -> bool {
        if self.frames.len() != 1 {
            return false;
        }
        self.cancel_target.take() == Some(TOP_LEVEL)
    }

    pub fn cancel_target(&self) -> Option<u64> {
        self.cancel_target
    }

    pub fn is_canceling(&self) -> bool {
        self.cancel_target.is_some()
    }

    /// Number of entries, including the bottom one.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[EvalFrame] {
        &self.frames
    }
}

impl Default for EvalStack {
    fn default() -> Self {
        Self::new()
    }
}

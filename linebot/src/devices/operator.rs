/// Status output. Receives finished text; wrapping and layout are the sink's
/// business.
pub trait Display {
    fn show(&mut self, text: &str);
}

/// Operator buttons.
pub trait OperatorInput {
    /// Blocks until the operator confirms the current step.
    ///
    /// Returns `false` when the step was skipped instead of confirmed.
    fn await_confirm(&mut self) -> bool;

    /// Raw state of the cancel button, polled once per control cycle.
    fn cancel_pressed(&mut self) -> bool;
}

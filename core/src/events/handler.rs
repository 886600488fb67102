use super::ZoneSignal;

/// Receives every signal produced by a tick, after the lifecycle pipelines
/// for that tick have run.
pub trait SignalHandler {
    fn handle_signal(&mut self, signal: &ZoneSignal);
}

impl<F> SignalHandler for F
where
    F: FnMut(&ZoneSignal),
{
    fn handle_signal(&mut self, signal: &ZoneSignal) {
        self(signal)
    }
}

/// Commands sent to the long-running loops (ingestion engine, panadapter publisher).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Stop the loop and release everything it owns.
    Stop,
}

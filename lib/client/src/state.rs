/// Client connection state. `Asleep`/`Awake` are reserved for a future
/// sleeping-client client-side implementation; this engine never enters
/// them (see spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Disconnected,
    Searching,
    Connecting,
    Active,
    Lost,
    /// Reserved, unused by this engine.
    Asleep,
    /// Reserved, unused by this engine.
    Awake,
}

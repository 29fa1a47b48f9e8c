use bitflags::bitflags;

bitflags! {
    /// How a method invocation is dispatched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InvocationOptions: u32 {
        /// Invoke on every handler that can, not just the first.
        const BROADCAST = 1 << 0;
        /// Nothing handling the call is not an error.
        const BEST_EFFORT = 1 << 1;
        /// Targets must conform to the protocol.
        const STRICT = 1 << 2;
        /// Resolve protocol implementations first, then invoke on them.
        const RESOLVE = 1 << 3;
        /// Any target exposing the member will do, even under `STRICT`.
        const DUCK = 1 << 4;
        const NOTIFY = Self::BROADCAST.bits() | Self::BEST_EFFORT.bits();
    }
}

impl InvocationOptions {
    /// The single-bit options, in declaration order.
    pub const SINGLE: [InvocationOptions; 5] = [
        Self::BROADCAST,
        Self::BEST_EFFORT,
        Self::STRICT,
        Self::RESOLVE,
        Self::DUCK,
    ];
}

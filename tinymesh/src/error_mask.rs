use bitflags::bitflags;

bitflags! {
    /// Protocol errors observed by the service loop. They never interrupt processing, they
    ///  accumulate until the application resets them.
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct ErrorMask: u8 {
        /// a peer is running an incompatible protocol version
        const VERSION_MISMATCH = 0b001;
        /// a frame arrived with our own address as its MAC source
        const DUPLICATE_NODE = 0b010;
        /// the application refused a frame addressed to us
        const APP_RECV_FAILED = 0b100;
    }
}

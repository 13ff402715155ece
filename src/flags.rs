bitflags! {
    /// Per-operand classification bitfield: size class, operand class, and the handful of
    /// syntactic modifiers (`FAR`/`NEAR`/`SHORT`/`STRICT`/`:`/`TO`) that change how a template
    /// is matched rather than what bytes come out.
    #[derive(Default)]
    pub struct OperandFlags: u32 {
        const BITS8    = 0x0000_0001;
        const BITS16   = 0x0000_0002;
        const BITS32   = 0x0000_0004;
        const BITS64   = 0x0000_0008;
        const BITS80   = 0x0000_0010;
        const BITS128  = 0x0000_0020;
        const BITS256  = 0x0000_0040;
        const BITS512  = 0x0000_0080;
        const SIZE_MASK = Self::BITS8.bits | Self::BITS16.bits | Self::BITS32.bits
            | Self::BITS64.bits | Self::BITS80.bits | Self::BITS128.bits
            | Self::BITS256.bits | Self::BITS512.bits;

        const REGISTER  = 0x0000_0100;
        const MEMORY    = 0x0000_0200;
        const IMMEDIATE = 0x0000_0400;
        const REGMEM    = Self::REGISTER.bits | Self::MEMORY.bits;
        const CLASS_MASK = Self::REGISTER.bits | Self::MEMORY.bits | Self::IMMEDIATE.bits;

        const FAR    = 0x0001_0000;
        const NEAR   = 0x0002_0000;
        const SHORT  = 0x0004_0000;
        const STRICT = 0x0008_0000;
        const COLON  = 0x0010_0000;
        const TO     = 0x0020_0000;

        const UNKNOWN = 0x0040_0000;

        /// Optimizer-inserted hint: a forward-ref immediate that might still fit in one byte.
        const UNITY       = 0x0100_0000;
        const SBYTEWORD   = 0x0200_0000;
        const SBYTEDWORD  = 0x0400_0000;
        const UDWORD      = 0x0800_0000;
        const SDWORD      = 0x1000_0000;
    }
}

bitflags! {
    /// EVEX/AVX decorator state attached to one operand.
    #[derive(Default)]
    pub struct DecoratorMask: u16 {
        const OPMASK      = 0x0001;
        const ZEROING     = 0x0002;
        const BROADCAST   = 0x0004;
        const STATIC_ROUNDING = 0x0008;
        const SAE         = 0x0010;
    }
}

bitflags! {
    /// Per-template flags, mirroring the `IF_*` constants of the real instruction table.
    #[derive(Default)]
    pub struct TemplateFlags: u32 {
        /// Non-immediate operands must all be the same size ("size match").
        const SM    = 0x0000_0001;
        /// Like `SM` but only between operands 0 and 1.
        const SM2   = 0x0000_0002;
        const SB    = 0x0000_0004;
        const SW    = 0x0000_0008;
        const SD    = 0x0000_0010;
        const SQ    = 0x0000_0020;
        const SO    = 0x0000_0040;
        const SY    = 0x0000_0080;
        const SZ    = 0x0000_0100;
        /// Explicit size override permitted even without `STRICT`.
        const SX    = 0x0000_0200;
        const AR0   = 0x0000_0400;
        const AR1   = 0x0000_0800;
        const AR2   = 0x0000_1000;
        const BND   = 0x0000_2000;
        const NOHLE = 0x0000_4000;
        const LOCK  = 0x0000_8000;
        const MIB   = 0x0001_0000;
        /// Only tried when the optimizer is enabled.
        const OPT   = 0x0002_0000;
        const LONG   = 0x0004_0000;
        const NOLONG = 0x0008_0000;
        const VEX   = 0x0010_0000;
        const EVEX  = 0x0020_0000;
    }
}

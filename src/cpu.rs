use num_derive::{FromPrimitive, ToPrimitive};

/// Minimum CPU required by a template, ordered so `cmp_cpu_level(required, current)` is a
/// plain numeric comparison.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, ToPrimitive, FromPrimitive)]
pub enum CpuLevel {
    Any8086,
    Level286,
    Level386,
    Level486,
    Pentium,
    P6,
    Sse,
    Sse2,
    Sse3,
    Ssse3,
    Sse41,
    Sse42,
    Avx,
    Avx2,
    Avx512f,
    /// Any instruction only the assembler accepts because a template marks it `IF_OPT`.
    Optimizing,
}

impl CpuLevel {
    /// A template gated at `required` may be matched when assembling for `current`.
    pub fn satisfied_by(self, current: CpuLevel) -> bool {
        self <= current
    }
}

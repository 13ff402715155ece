//! Line-to-offset bookkeeping the driver accumulates alongside the assembled bytes, so a
//! debugger can map a byte offset in the output back to the source line that produced it.

/// One run of bytes attributed to a single source line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SourceMapItem {
    pub start_line: u32,
    pub line_count: u32,
}

pub type SourceMap = Vec<SourceMapItem>;

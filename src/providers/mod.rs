mod tei;

pub use tei::TeiCrossEncoder;

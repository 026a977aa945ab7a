pub mod diagnostic;
pub mod node;

pub use diagnostic::{ParseDiagnostic, Severity};
pub use node::{Node, NodeId, NodeKind, Position, Range, RequisiteKind, SlsTree};

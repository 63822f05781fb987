//! Ticket hierarchy derived from free-text bodies.
//!
//! The tracker has no notion of parent and child. Relationships live in the
//! bodies themselves, as a `### Parent:` section on the child and a
//! `### Children:` task list on the parent. This module parses those sections,
//! keeps both ends in agreement and links bare references to their titles.

mod enhancer;
mod parser;
mod sections;
mod serializer;
mod synchronizer;

pub use enhancer::{bare_references, BareReference, ReferenceEnhancer};
pub use parser::{child_references, children_section, ChildrenSection};
pub use sections::{
    child_entry, parent_reference, with_child, with_parent, CHILDREN_HEADING, PARENT_HEADING,
};
pub use serializer::UpdateSerializer;
pub use synchronizer::{
    FanOutFailure, HierarchyError, HierarchySync, NewTicketRequest, UpdateOutcome,
    AUTOMATION_LABELS,
};

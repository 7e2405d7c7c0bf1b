//! # trellis-xdm
//!
//! The data model consumed by the Trellis XSLT runtime.
//!
//! | Module | Contents |
//! |---|---|
//! | [`qname`] | Expanded names, namespace bindings, static namespace resolution |
//! | [`atomic`] | Atomic values, casting and promotion, comparison keys |
//! | [`item`] | Items, shared sequences, effective boolean value |
//! | [`tree`] | Arena trees, node navigation, the tree builder and XML loading |
//! | [`receiver`] | The push-mode [`Receiver`] protocol and [`SequenceOutputter`] |
//! | [`serialize`] | XML output |

pub mod atomic;
pub mod error;
pub mod item;
pub mod qname;
pub mod receiver;
pub mod serialize;
pub mod tree;

pub use atomic::{AtomicType, AtomicValue, ComparisonKey};
pub use error::XdmError;
pub use item::{Item, Sequence, effective_boolean_value};
pub use qname::{
    NamespaceBinding, NamespaceResolver, QName, StaticNamespaces, XML_NAMESPACE, XMLNS_NAMESPACE,
    XSLT_NAMESPACE, is_ncname, split_qname,
};
pub use receiver::{Receiver, SequenceOutputter, copy_node};
pub use serialize::serialize;
pub use tree::{Document, NodeHandle, NodeKind, TreeBuilder, parse_document, resolve_uri};

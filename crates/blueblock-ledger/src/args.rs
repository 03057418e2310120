//! Method-call argument vectors.
//!
//! Anchor calls travel as a list of byte strings, method name first:
//!
//! ```text
//! ["anchor", project_id, merkle_root (32 bytes), itob(record_count), itob(from), itob(to)]
//! ["get_anchor", itob(index)]
//! ```
//!
//! Other transitions are carried by the call type itself, not by arguments,
//! and have no argument-vector form.

use blueblock_types::{MerkleRoot, ProjectId};

use crate::error::LedgerError;
use crate::keyspace::{btoi, itob};
use crate::transition::{AnchorSubmission, Transition};

pub const METHOD_ANCHOR: &[u8] = b"anchor";
pub const METHOD_GET_ANCHOR: &[u8] = b"get_anchor";

/// Encode a method call. Returns `None` for transitions without an argument form.
pub fn encode_app_args(transition: &Transition) -> Option<Vec<Vec<u8>>> {
    match transition {
        Transition::SubmitAnchor(s) => Some(vec![
            METHOD_ANCHOR.to_vec(),
            s.project_id.as_bytes().to_vec(),
            s.merkle_root.as_bytes().to_vec(),
            itob(s.record_count).to_vec(),
            itob(s.window_start).to_vec(),
            itob(s.window_end).to_vec(),
        ]),
        Transition::GetAnchor { index } => {
            Some(vec![METHOD_GET_ANCHOR.to_vec(), itob(*index).to_vec()])
        }
        _ => None,
    }
}

/// Decode a method call into its transition.
pub fn decode_app_args<A: AsRef<[u8]>>(args: &[A]) -> Result<Transition, LedgerError> {
    let (method, rest) = args
        .split_first()
        .ok_or_else(|| LedgerError::invalid("missing method name"))?;

    match method.as_ref() {
        METHOD_ANCHOR => {
            let [project, root, count, from, to] = rest else {
                return Err(arity("anchor", 5, rest.len()));
            };
            let merkle_root = MerkleRoot::from_slice(root.as_ref())
                .map_err(|e| LedgerError::InvalidArgument(format!("merkle_root: {e}")))?;
            Ok(Transition::SubmitAnchor(AnchorSubmission {
                project_id: ProjectId::new(project.as_ref().to_vec()),
                merkle_root,
                record_count: btoi(count.as_ref())?,
                window_start: btoi(from.as_ref())?,
                window_end: btoi(to.as_ref())?,
            }))
        }
        METHOD_GET_ANCHOR => {
            let [index] = rest else {
                return Err(arity("get_anchor", 1, rest.len()));
            };
            Ok(Transition::GetAnchor {
                index: btoi(index.as_ref())?,
            })
        }
        other => Err(LedgerError::InvalidArgument(format!(
            "unknown method: {}",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn arity(method: &str, expected: usize, actual: usize) -> LedgerError {
    LedgerError::InvalidArgument(format!(
        "{method} takes {expected} arguments after the method name, got {actual}"
    ))
}

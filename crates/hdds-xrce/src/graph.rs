// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Per-ProxyClient object graph: creation-mode policy, parent/kind
// validation, cascading delete.

use std::collections::HashMap;

use crate::error::XrceError;
use crate::middleware::{Handle, Middleware};
use crate::submessage::{CreatePayload, ObjectRepresentation, StatusValue};
use crate::wire::{ObjectId, ObjectKind};

/// One entity owned by a ProxyClient.
#[derive(Debug, Clone)]
pub struct Object {
    pub kind: ObjectKind,
    pub parent_ids: Vec<ObjectId>,
    pub representation: ObjectRepresentation,
    pub handle: Handle,
}

fn required_parent_kinds(kind: ObjectKind) -> &'static [ObjectKind] {
    use ObjectKind::*;
    match kind {
        Participant | Client | Application | QosProfile | Type => &[],
        Topic | Publisher | Subscriber => &[ObjectKind::Participant],
        DataWriter => &[ObjectKind::Publisher, ObjectKind::Topic],
        DataReader => &[ObjectKind::Subscriber, ObjectKind::Topic],
        Requester | Replier => &[
            ObjectKind::Participant,
            ObjectKind::Topic,
            ObjectKind::Topic,
        ],
    }
}

/// Typed registry of one ProxyClient's objects.
#[derive(Default)]
pub struct ObjectGraph {
    objects: HashMap<ObjectId, Object>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn validate_parents(&self, kind: ObjectKind, parent_ids: &[ObjectId]) -> Option<Vec<Handle>> {
        let required = required_parent_kinds(kind);
        if parent_ids.len() != required.len() {
            return None;
        }
        let mut needed = required.to_vec();
        let mut handles = Vec::with_capacity(parent_ids.len());
        for pid in parent_ids {
            let obj = self.objects.get(pid)?;
            let pos = needed.iter().position(|k| *k == obj.kind)?;
            needed.remove(pos);
            handles.push(obj.handle);
        }
        Some(handles)
    }

    /// Apply the reuse/replace creation-mode table for a CREATE submessage.
    pub fn create(&mut self, mw: &dyn Middleware, req: &CreatePayload) -> StatusValue {
        let kind = match req.object_id.kind() {
            Ok(k) => k,
            Err(_) => return StatusValue::InvalidDataError,
        };

        if let Some(existing) = self.objects.get(&req.object_id) {
            let matches = existing.representation.same_form_as(&req.representation)
                || match &req.representation {
                    ObjectRepresentation::ByRef(r) => mw.match_ref(existing.handle, r),
                    ObjectRepresentation::ByXml(x) => mw.match_xml(existing.handle, x),
                    ObjectRepresentation::ByBinary(_) => false,
                };
            match (req.creation_mode.reuse, req.creation_mode.replace) {
                (false, false) => return StatusValue::AlreadyExistsError,
                (true, false) => {
                    return if matches {
                        StatusValue::OkMatched
                    } else {
                        StatusValue::MismatchError
                    };
                }
                (true, true) if matches => return StatusValue::OkMatched,
                _ => {
                    self.delete_recursive(mw, req.object_id);
                }
            }
        }

        let parent_handles = match self.validate_parents(kind, &req.parent_ids) {
            Some(h) => h,
            None => return StatusValue::UnknownReferenceError,
        };

        let created = match &req.representation {
            ObjectRepresentation::ByRef(r) => {
                mw.create_by_ref(kind, req.object_id, &parent_handles, r)
            }
            ObjectRepresentation::ByXml(x) => {
                mw.create_by_xml(kind, req.object_id, &parent_handles, x)
            }
            ObjectRepresentation::ByBinary(b) => {
                mw.create_by_binary(kind, req.object_id, &parent_handles, b)
            }
        };

        match created {
            Ok(handle) => {
                self.objects.insert(
                    req.object_id,
                    Object {
                        kind,
                        parent_ids: req.parent_ids.clone(),
                        representation: req.representation.clone(),
                        handle,
                    },
                );
                StatusValue::Ok
            }
            Err(_) => StatusValue::DdsError,
        }
    }

    /// Delete `id` and, recursively, every object whose parent chain
    /// includes it. Returns `false` if `id` was not present.
    pub fn delete_recursive(&mut self, mw: &dyn Middleware, id: ObjectId) -> bool {
        if !self.objects.contains_key(&id) {
            return false;
        }
        let children: Vec<ObjectId> = self
            .objects
            .iter()
            .filter(|(_, o)| o.parent_ids.contains(&id))
            .map(|(oid, _)| *oid)
            .collect();
        for child in children {
            self.delete_recursive(mw, child);
        }
        if let Some(obj) = self.objects.remove(&id) {
            let _ = mw.delete(obj.handle);
        }
        true
    }

    pub fn delete_object(&mut self, mw: &dyn Middleware, id: ObjectId) -> StatusValue {
        if self.delete_recursive(mw, id) {
            StatusValue::Ok
        } else {
            StatusValue::UnknownReferenceError
        }
    }

    pub fn write(&self, mw: &dyn Middleware, id: ObjectId, data: &[u8]) -> Result<(), XrceError> {
        let obj = self.objects.get(&id).ok_or(XrceError::ObjectNotFound(id))?;
        mw.write(obj.handle, data)
    }

    pub fn handle_of(&self, id: ObjectId) -> Option<Handle> {
        self.objects.get(&id).map(|o| o.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::NullMiddleware;
    use crate::submessage::CreationMode;
    use crate::wire::RequestId;

    fn create_req(
        id: u16,
        kind: ObjectKind,
        parents: Vec<ObjectId>,
        mode: CreationMode,
        reference: &str,
    ) -> CreatePayload {
        CreatePayload {
            request_id: RequestId(0),
            object_id: ObjectId::new(id, kind),
            parent_ids: parents,
            creation_mode: mode,
            representation: ObjectRepresentation::ByRef(reference.to_string()),
        }
    }

    #[test]
    fn creation_mode_truth_table() {
        let mw = NullMiddleware::new();
        let mut g = ObjectGraph::new();
        let req0 = create_req(
            1,
            ObjectKind::Participant,
            vec![],
            CreationMode {
                reuse: false,
                replace: false,
            },
            "default_xrce_participant",
        );
        assert_eq!(g.create(&mw, &req0), StatusValue::Ok);

        // (0,0): already exists
        assert_eq!(g.create(&mw, &req0), StatusValue::AlreadyExistsError);

        // (1,0, match): OK_MATCHED
        let req_reuse = create_req(
            1,
            ObjectKind::Participant,
            vec![],
            CreationMode {
                reuse: true,
                replace: false,
            },
            "default_xrce_participant",
        );
        assert_eq!(g.create(&mw, &req_reuse), StatusValue::OkMatched);

        // (1,0, mismatch): MISMATCH_ERROR
        let req_mismatch = create_req(
            1,
            ObjectKind::Participant,
            vec![],
            CreationMode {
                reuse: true,
                replace: false,
            },
            "other_participant",
        );
        assert_eq!(g.create(&mw, &req_mismatch), StatusValue::MismatchError);

        // (1,1, match): OK_MATCHED
        let req_reuse_replace = create_req(
            1,
            ObjectKind::Participant,
            vec![],
            CreationMode {
                reuse: true,
                replace: true,
            },
            "default_xrce_participant",
        );
        assert_eq!(g.create(&mw, &req_reuse_replace), StatusValue::OkMatched);

        // (0,1): delete existing, create new
        let req_replace = create_req(
            1,
            ObjectKind::Participant,
            vec![],
            CreationMode {
                reuse: false,
                replace: true,
            },
            "replaced_participant",
        );
        assert_eq!(g.create(&mw, &req_replace), StatusValue::Ok);
        assert_eq!(
            g.get(ObjectId::new(1, ObjectKind::Participant))
                .unwrap()
                .representation,
            ObjectRepresentation::ByRef("replaced_participant".into())
        );
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mw = NullMiddleware::new();
        let mut g = ObjectGraph::new();
        let req = create_req(
            1,
            ObjectKind::Topic,
            vec![ObjectId::new(99, ObjectKind::Participant)],
            CreationMode::default(),
            "my_topic",
        );
        assert_eq!(g.create(&mw, &req), StatusValue::UnknownReferenceError);
    }

    #[test]
    fn cascade_delete_removes_descendants() {
        let mw = NullMiddleware::new();
        let mut g = ObjectGraph::new();
        let participant = ObjectId::new(1, ObjectKind::Participant);
        let topic = ObjectId::new(2, ObjectKind::Topic);
        let publisher = ObjectId::new(3, ObjectKind::Publisher);
        let writer = ObjectId::new(4, ObjectKind::DataWriter);

        assert_eq!(
            g.create(
                &mw,
                &create_req(
                    1,
                    ObjectKind::Participant,
                    vec![],
                    CreationMode::default(),
                    "p"
                )
            ),
            StatusValue::Ok
        );
        assert_eq!(
            g.create(
                &mw,
                &create_req(
                    2,
                    ObjectKind::Topic,
                    vec![participant],
                    CreationMode::default(),
                    "t"
                )
            ),
            StatusValue::Ok
        );
        assert_eq!(
            g.create(
                &mw,
                &create_req(
                    3,
                    ObjectKind::Publisher,
                    vec![participant],
                    CreationMode::default(),
                    "pub"
                )
            ),
            StatusValue::Ok
        );
        assert_eq!(
            g.create(
                &mw,
                &create_req(
                    4,
                    ObjectKind::DataWriter,
                    vec![publisher, topic],
                    CreationMode::default(),
                    "w"
                )
            ),
            StatusValue::Ok
        );

        assert_eq!(g.delete_object(&mw, participant), StatusValue::Ok);
        assert!(g.get(participant).is_none());
        assert!(g.get(topic).is_none());
        assert!(g.get(publisher).is_none());
        assert!(g.get(writer).is_none());
    }

    #[test]
    fn delete_nonexistent_is_unknown_reference() {
        let mw = NullMiddleware::new();
        let mut g = ObjectGraph::new();
        assert_eq!(
            g.delete_object(&mw, ObjectId::new(1, ObjectKind::Topic)),
            StatusValue::UnknownReferenceError
        );
    }
}

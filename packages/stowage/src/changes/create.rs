use std::collections::HashSet;

use tracing::debug;

use super::Staged;
use crate::attacher::Attacher;
use crate::attachment::{Attachable, Attachment, OwnerRef};
use crate::error::Result;
use crate::signed::ReferenceCodec;
use crate::slots::Slot;

/// Assign one attachable to a slot.
#[derive(Debug, Clone)]
pub struct CreateOne {
    name: String,
    attachment: Attachment,
}

impl CreateOne {
    /// Resolve `input` against `candidates`, else build a new attachment, and
    /// assign the input to it.
    ///
    /// A signed reference naming one of the candidates reuses that
    /// attachment as it is, so resubmitting a form does not create a second
    /// row or upload the bytes again. A token minted before the candidate's
    /// file changed (e.g. before promotion) still names it; the candidate
    /// keeps its current file. For a singular slot the candidates are the
    /// current attachment; for a plural slot they are the whole list.
    pub(crate) async fn build(
        attacher: &Attacher,
        slot: &Slot,
        owner: Option<OwnerRef>,
        candidates: &[Attachment],
        input: Attachable,
    ) -> Result<Self> {
        let attachment = match find_candidate(attacher.codec(), candidates, &input)? {
            Some(Candidate { attachment, current }) => {
                if current {
                    debug!(slot = slot.name(), attachment_id = %attachment.id, "Reusing attachment");
                } else {
                    debug!(
                        slot = slot.name(),
                        attachment_id = %attachment.id,
                        "Reusing attachment from an outdated reference"
                    );
                }
                attachment.clone()
            }
            None => {
                let mut attachment =
                    Attachment::build(owner, slot.name(), slot.uploader().attachment_type());
                attachment
                    .assign(input, attacher.codec(), attacher.storage())
                    .await?;
                attachment
            }
        };

        Ok(Self {
            name: slot.name().to_string(),
            attachment,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attachment(&self) -> &Attachment {
        &self.attachment
    }

    pub(crate) async fn save(&self, attacher: &Attacher, slot: &Slot) -> Result<Staged> {
        let errors = attacher.validate(&self.attachment, slot).await?;
        if errors.is_empty() {
            Ok(Staged::Valid(vec![self.attachment.clone()]))
        } else {
            Ok(Staged::Invalid(errors))
        }
    }
}

struct Candidate<'a> {
    attachment: &'a Attachment,
    /// The token is exactly the candidate's current signed id.
    current: bool,
}

fn find_candidate<'a>(
    codec: &ReferenceCodec,
    candidates: &'a [Attachment],
    input: &Attachable,
) -> Result<Option<Candidate<'a>>> {
    let Attachable::Reference(token) = input else {
        return Ok(None);
    };

    for attachment in candidates {
        if attachment.signed_id(codec)? == *token {
            return Ok(Some(Candidate {
                attachment,
                current: true,
            }));
        }
    }

    let Some(id) = codec.decode_reference(token).and_then(|r| r.id) else {
        return Ok(None);
    };
    Ok(candidates
        .iter()
        .find(|attachment| attachment.id == id)
        .map(|attachment| Candidate {
            attachment,
            current: false,
        }))
}

/// Assign a list of attachables to a plural slot.
#[derive(Debug, Clone)]
pub struct CreateMany {
    name: String,
    subchanges: Vec<CreateOne>,
    pending_uploads: Vec<CreateOne>,
}

impl CreateMany {
    /// Build one sub-change per input. `previous_uploads` are the pending
    /// uploads of the change this one supersedes; those not resolved again
    /// by one of `inputs` are carried forward.
    pub(crate) async fn build(
        attacher: &Attacher,
        slot: &Slot,
        owner: Option<OwnerRef>,
        candidates: &[Attachment],
        inputs: Vec<Attachable>,
        previous_uploads: Vec<CreateOne>,
    ) -> Result<Self> {
        let mut subchanges = Vec::with_capacity(inputs.len());
        for input in inputs {
            subchanges.push(CreateOne::build(attacher, slot, owner.clone(), candidates, input).await?);
        }

        let resolved: HashSet<_> = subchanges.iter().map(|c| c.attachment.id).collect();
        let mut pending_uploads: Vec<CreateOne> = previous_uploads
            .into_iter()
            .filter(|c| !resolved.contains(&c.attachment.id))
            .collect();
        pending_uploads.extend(subchanges.iter().cloned());

        Ok(Self {
            name: slot.name().to_string(),
            subchanges,
            pending_uploads,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attachments(&self) -> impl Iterator<Item = &Attachment> {
        self.subchanges.iter().map(CreateOne::attachment)
    }

    pub fn subchanges(&self) -> &[CreateOne] {
        &self.subchanges
    }

    pub fn pending_uploads(&self) -> &[CreateOne] {
        &self.pending_uploads
    }

    pub(crate) async fn save(&self, attacher: &Attacher, slot: &Slot) -> Result<Staged> {
        let mut errors = Vec::new();
        for change in &self.subchanges {
            if let Staged::Invalid(messages) = change.save(attacher, slot).await? {
                for message in messages {
                    if !errors.contains(&message) {
                        errors.push(message);
                    }
                }
            }
        }
        if !errors.is_empty() {
            return Ok(Staged::Invalid(errors));
        }

        // Keep rows that are persisted or newly built, once each.
        let mut seen = HashSet::new();
        let attachments = self
            .attachments()
            .filter(|a| a.is_persisted() || a.is_new_record())
            .filter(|a| seen.insert(a.id))
            .cloned()
            .collect();
        Ok(Staged::Valid(attachments))
    }
}

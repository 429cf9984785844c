use crate::attacher::Attacher;
use crate::attachment::Attachment;
use crate::error::Result;

/// Remove a singular slot's association row now, keeping the stored file.
#[derive(Debug, Clone)]
pub struct DetachOne {
    name: String,
    attachment: Option<Attachment>,
}

impl DetachOne {
    pub fn new(name: impl Into<String>, attachment: Option<Attachment>) -> Self {
        Self {
            name: name.into(),
            attachment,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    pub(crate) async fn detach(&mut self, attacher: &Attacher) -> Result<()> {
        if let Some(attachment) = &mut self.attachment {
            attacher.delete_attachment(attachment).await?;
        }
        Ok(())
    }
}

/// Remove every association row of a plural slot now, keeping stored files.
#[derive(Debug, Clone)]
pub struct DetachMany {
    name: String,
    attachments: Vec<Attachment>,
}

impl DetachMany {
    pub fn new(name: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            name: name.into(),
            attachments,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub(crate) async fn detach(&mut self, attacher: &Attacher) -> Result<()> {
        for attachment in &mut self.attachments {
            attacher.delete_attachment(attachment).await?;
        }
        Ok(())
    }
}

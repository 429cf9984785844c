use crate::attacher::Attacher;
use crate::attachment::Attachment;
use crate::error::Result;

/// Destroy a singular slot's row and stored file now.
#[derive(Debug, Clone)]
pub struct PurgeOne {
    name: String,
    attachment: Option<Attachment>,
}

impl PurgeOne {
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

    pub(crate) async fn purge(&mut self, attacher: &Attacher) -> Result<()> {
        if let Some(attachment) = &mut self.attachment {
            attacher.purge_attachment(attachment).await?;
        }
        Ok(())
    }

    pub(crate) async fn purge_later(&mut self, attacher: &Attacher) -> Result<()> {
        attacher.require_queue()?;
        if let Some(attachment) = &mut self.attachment {
            attacher.purge_attachment_later(attachment).await?;
        }
        Ok(())
    }
}

/// Destroy every row and stored file of a plural slot now.
#[derive(Debug, Clone)]
pub struct PurgeMany {
    name: String,
    attachments: Vec<Attachment>,
}

impl PurgeMany {
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

    pub(crate) async fn purge(&mut self, attacher: &Attacher) -> Result<()> {
        for attachment in &mut self.attachments {
            attacher.purge_attachment(attachment).await?;
        }
        Ok(())
    }

    pub(crate) async fn purge_later(&mut self, attacher: &Attacher) -> Result<()> {
        attacher.require_queue()?;
        for attachment in &mut self.attachments {
            attacher.purge_attachment_later(attachment).await?;
        }
        Ok(())
    }
}

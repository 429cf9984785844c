/// Unassign a singular slot at the next save.
#[derive(Debug, Clone)]
pub struct DeleteOne {
    name: String,
}

impl DeleteOne {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Empty a plural slot at the next save.
#[derive(Debug, Clone)]
pub struct DeleteMany {
    name: String,
}

impl DeleteMany {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Request-scoped data handed to every field function and driver call.
///
/// - `request_id`: correlation id from the inbound request, if any
/// - `partial`: the operation is a partial update; absent fields are not missing
#[derive(Debug, Clone, Default)]
pub struct Context {
    request_id: Option<String>,
    partial: bool,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }
}

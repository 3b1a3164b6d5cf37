/// Render output collected for one template.
///
/// Content only leaves the buffer through [`OutputBuffer::finish`]. A buffer
/// dropped any other way (an error propagated with `?`, a panic unwinding
/// through the render) takes its partial content with it.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    content: String,
    finished: bool,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_str(&mut self, text: &str) {
        self.content.push_str(text);
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn finish(mut self) -> String {
        self.finished = true;
        std::mem::take(&mut self.content)
    }
}

impl Drop for OutputBuffer {
    fn drop(&mut self) {
        if !self.finished {
            tracing::trace!(bytes = self.content.len(), "discarding partial render output");
        }
    }
}

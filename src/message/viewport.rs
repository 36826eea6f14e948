use super::model::Message;

/// Near-bottom distance within which the view keeps following new messages.
const FOLLOW_THRESHOLD: f64 = 24.0;
/// Distance from the top that should trigger loading an older page.
const LOAD_OLDER_THRESHOLD: f64 = 48.0;

/// Rendered height of a message row.
pub trait RowMetrics {
    fn height(&self, msg: &Message) -> f64;

    fn total(&self, messages: &[Message]) -> f64 {
        messages.iter().map(|m| self.height(m)).sum()
    }
}

/// Every row has the same height.
#[derive(Clone, Copy, Debug)]
pub struct UniformRows(pub f64);

impl RowMetrics for UniformRows {
    fn height(&self, _: &Message) -> f64 {
        self.0
    }
}

/// Scroll state of the message list, independent from rendering.
#[derive(Clone, Debug, PartialEq)]
pub struct Viewport {
    scroll_top: f64,
    viewport_height: f64,
    content_height: f64,
    follow_bottom: bool,
}

impl Viewport {
    pub fn new(viewport_height: f64) -> Self {
        Self {
            scroll_top: 0.0,
            viewport_height,
            content_height: 0.0,
            follow_bottom: true,
        }
    }

    pub const fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    pub const fn content_height(&self) -> f64 {
        self.content_height
    }

    pub const fn viewport_height(&self) -> f64 {
        self.viewport_height
    }

    pub const fn is_following_bottom(&self) -> bool {
        self.follow_bottom
    }

    pub fn max_offset(&self) -> f64 {
        (self.content_height - self.viewport_height).max(0.0)
    }

    pub fn is_near_bottom(&self) -> bool {
        self.max_offset() - self.scroll_top <= FOLLOW_THRESHOLD
    }

    pub fn is_near_top(&self) -> bool {
        self.scroll_top <= LOAD_OLDER_THRESHOLD
    }

    /// User scroll. Following resumes only once the user is back at the tail.
    pub fn scroll_to(&mut self, top: f64) {
        self.scroll_top = top.clamp(0.0, self.max_offset());
        self.follow_bottom = self.is_near_bottom();
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_top = self.max_offset();
        self.follow_bottom = true;
    }

    /// Rows were inserted above the visible ones; shift by the same amount
    /// so nothing on screen moves.
    pub fn content_prepended(&mut self, added: f64) {
        self.content_height += added;
        self.scroll_top += added;
    }

    /// The tail changed; stick to the bottom when following.
    pub fn content_resized(&mut self, total: f64) {
        self.content_height = total;
        if self.follow_bottom {
            self.scroll_to_bottom();
        } else {
            self.scroll_top = self.scroll_top.clamp(0.0, self.max_offset());
        }
    }

    pub fn resize(&mut self, viewport_height: f64) {
        self.viewport_height = viewport_height;
        self.content_resized(self.content_height);
    }
}

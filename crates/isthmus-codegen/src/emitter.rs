//! Indented source text builder shared by both renderers.

pub(crate) struct Emitter {
    out: String,
    indent: usize,
}

impl Emitter {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
        }
    }

    pub fn line(&mut self, s: impl AsRef<str>) {
        let s = s.as_ref();
        if !s.is_empty() {
            for _ in 0..self.indent {
                self.out.push_str("    ");
            }
            self.out.push_str(s);
        }
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Emit `head` and indent until the matching [`Emitter::close`].
    pub fn open(&mut self, head: impl AsRef<str>) {
        self.line(head);
        self.indent += 1;
    }

    pub fn close(&mut self, tail: impl AsRef<str>) {
        self.indent = self.indent.saturating_sub(1);
        self.line(tail);
    }

    /// A line one level out from the current block, for C labels.
    pub fn label(&mut self, s: impl AsRef<str>) {
        let indent = self.indent;
        self.indent = indent.saturating_sub(1);
        self.line(s);
        self.indent = indent;
    }

    pub fn finish(self) -> String {
        self.out
    }
}

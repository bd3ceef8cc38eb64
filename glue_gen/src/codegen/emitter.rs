use crate::sink::{OutputSink, SinkResult};
use std::path::{Path, PathBuf};

/* First lines of every generated source file */
pub const HEADER: [&str; 2] = [
  "/* autogenerated by glue: edit the schema, not this file */",
  "/* eslint-disable */",
];

/// Line-oriented text builder with tab indentation. Output is buffered and
/// handed to a sink in one piece by [`Emitter::finish`].
#[derive(Debug)]
pub struct Emitter {
  path: PathBuf,
  out: String,
  depth: usize,
}

impl Emitter {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      out: String::new(),
      depth: 0,
    }
  }

  /* Source file starting with the generated-file header */
  pub fn source(path: impl Into<PathBuf>) -> Self {
    let mut emitter = Self::new(path);
    for line in HEADER {
      emitter.line(line);
    }
    emitter.blank();
    emitter
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn indent(&mut self) -> &mut Self {
    self.depth += 1;
    self
  }

  pub fn dedent(&mut self) -> &mut Self {
    self.depth = self.depth.saturating_sub(1);
    self
  }

  /// Indented line. Multi-line text is indented line by line.
  pub fn line(&mut self, text: impl AsRef<str>) -> &mut Self {
    for line in text.as_ref().split('\n') {
      if !line.is_empty() {
        for _ in 0..self.depth {
          self.out.push('\t');
        }
        self.out.push_str(line);
      }
      self.out.push('\n');
    }
    self
  }

  pub fn blank(&mut self) -> &mut Self {
    self.out.push('\n');
    self
  }

  /* Raw text, no indentation or newline */
  pub fn chars(&mut self, text: &str) -> &mut Self {
    self.out.push_str(text);
    self
  }

  /// Line followed by an indent, e.g. `class X {`.
  pub fn open(&mut self, text: impl AsRef<str>) -> &mut Self {
    self.line(text);
    self.indent()
  }

  /// Dedent followed by a line, e.g. `}`.
  pub fn close(&mut self, text: impl AsRef<str>) -> &mut Self {
    self.dedent();
    self.line(text)
  }

  pub fn contents(&self) -> &str {
    &self.out
  }

  pub fn finish(self, sink: &mut dyn OutputSink) -> SinkResult<PathBuf> {
    sink.write(&self.path, &self.out)?;
    sink.close(&self.path)?;
    Ok(self.path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sink::MemorySink;

  #[test]
  fn test_indentation() {
    let mut e = Emitter::new("x.ts");
    e.open("class A {")
      .line("a = 1")
      .open("f() {")
      .line("return 2\nfoo()")
      .close("}")
      .close("}");
    assert_eq!(
      e.contents(),
      "class A {\n\ta = 1\n\tf() {\n\t\treturn 2\n\t\tfoo()\n\t}\n}\n"
    );
  }

  #[test]
  fn test_dedent_saturates_and_blank_lines_have_no_tabs() {
    let mut e = Emitter::new("x.ts");
    e.dedent().indent().line("").chars("raw");
    assert_eq!(e.contents(), "\nraw");
  }

  #[test]
  fn test_finish_writes_to_sink() {
    let mut sink = MemorySink::new();
    let mut e = Emitter::source("pkg/a.ts");
    e.line("export {}");
    let path = e.finish(&mut sink).unwrap();
    assert_eq!(path, PathBuf::from("pkg/a.ts"));
    let text = sink.get("pkg/a.ts").unwrap();
    assert!(text.starts_with(HEADER[0]));
    assert!(text.ends_with("export {}\n"));
  }
}

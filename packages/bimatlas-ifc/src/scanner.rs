//! Byte-level STEP scanner.
//!
//! Walks the `DATA;` section and yields `#id = TYPE ( … );` spans without
//! decoding attributes. Uses `memchr` to jump between `#` markers so large
//! files are scanned at memory bandwidth rather than parser speed.

use memchr::memchr;

/// One undecoded entity occurrence.
#[derive(Clone, Copy, Debug)]
pub struct RawEntity<'a> {
    pub id: u32,
    /// Upper-case type name as written (`IFCWALL`).
    pub type_name: &'a str,
    /// The attribute list including parentheses.
    pub body: &'a str,
}

/// Iterator over the entities of a STEP `DATA;` section.
pub struct EntityScanner<'a> {
    content: &'a str,
    pos: usize,
}

impl<'a> EntityScanner<'a> {
    /// Position the scanner after the `DATA;` keyword. Returns `None` when
    /// the input has no DATA section (not a STEP file).
    pub fn new(content: &'a str) -> Option<Self> {
        let pos = content.find("DATA;")? + "DATA;".len();
        Some(Self { content, pos })
    }

    fn skip_inline_ws(&mut self) {
        let bytes = self.content.as_bytes();
        while self.pos < bytes.len() && matches!(bytes[self.pos], b' ' | b'\t') {
            self.pos += 1;
        }
    }

    /// Advance past the entity terminator `;`, skipping quoted strings so a
    /// `;` inside a name does not end the entity early.
    fn entity_end(&mut self) -> Option<usize> {
        let bytes = self.content.as_bytes();
        let mut in_string = false;
        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b'\'' => {
                    if in_string && bytes.get(self.pos + 1) == Some(&b'\'') {
                        self.pos += 2;
                        continue;
                    }
                    in_string = !in_string;
                }
                b';' if !in_string => {
                    let end = self.pos;
                    self.pos += 1;
                    return Some(end);
                }
                _ => {}
            }
            self.pos += 1;
        }
        None
    }
}

impl<'a> Iterator for EntityScanner<'a> {
    type Item = RawEntity<'a>;

    fn next(&mut self) -> Option<RawEntity<'a>> {
        let bytes = self.content.as_bytes();

        loop {
            let hash = memchr(b'#', &bytes[self.pos..])?;
            self.pos += hash;

            // An instance definition starts a statement; a `#` elsewhere is a
            // reference inside an attribute list.
            let at_statement_start = self.pos == 0
                || matches!(bytes[self.pos - 1], b'\n' | b'\r' | b';');
            if !at_statement_start {
                self.pos += 1;
                continue;
            }

            self.pos += 1;
            let id_start = self.pos;
            while self.pos < bytes.len() && bytes[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
            if self.pos == id_start {
                continue;
            }
            let id: u32 = match self.content[id_start..self.pos].parse() {
                Ok(id) => id,
                Err(_) => continue,
            };

            self.skip_inline_ws();
            if bytes.get(self.pos) != Some(&b'=') {
                continue;
            }
            self.pos += 1;
            self.skip_inline_ws();

            let type_start = self.pos;
            while self.pos < bytes.len()
                && (bytes[self.pos].is_ascii_alphanumeric() || bytes[self.pos] == b'_')
            {
                self.pos += 1;
            }
            if self.pos == type_start {
                continue;
            }
            let type_name = &self.content[type_start..self.pos];

            let body_start = self.pos;
            let end = self.entity_end()?;

            return Some(RawEntity {
                id,
                type_name,
                body: self.content[body_start..end].trim(),
            });
        }
    }
}

/// Extract the first schema identifier from `FILE_SCHEMA(('IFC4X3'));`.
pub fn file_schema(content: &str) -> Option<String> {
    let header_start = content.find("HEADER;")?;
    let header = &content[header_start..content.find("DATA;").unwrap_or(content.len())];
    let schema = header.find("FILE_SCHEMA")?;
    let rest = &header[schema..];
    let open = rest.find('\'')? + 1;
    let close = rest[open..].find('\'')? + open;
    Some(rest[open..close].to_string())
}

use super::{ArchSpec, Compiler, Spec, SpecError, VariantValue, VersionReq};

/// Parse a spec string.
///
/// Syntax, in the order components may appear after the (optional) leading
/// package name:
///
/// - `@1.2`, `@1.2:1.4`, `@:1.4` — version constraint
/// - `%gcc`, `%gcc@12.1` — compiler constraint
/// - `+debug`, `~qt`, `-qt` — boolean variants (`-` only after whitespace)
/// - `name=value`, `name=a,b,c` — valued variants
/// - `platform=`, `os=`, `target=`, `gpu_arch=` — arch components
/// - `arch=platform-os-cpu[-gpu]` — combined arch (`nil` parts are skipped)
/// - `^dep...` — a direct dependency, itself a full spec
///
/// A spec with no leading name is anonymous and usable as a constraint
/// (e.g. the `when` clauses in package manifests).
pub fn parse_spec(input: &str) -> Result<Spec, SpecError> {
    let mut p = Parser {
        src: input,
        pos: 0,
    };
    p.skip_ws();
    if p.at_end() {
        return Err(SpecError::Empty);
    }

    let mut root = p.parse_one()?;
    while !p.at_end() {
        if !p.eat(b'^') {
            return Err(p.unexpected());
        }
        let dep = p.parse_one()?;
        if dep.name.is_empty() {
            return Err(p.unexpected());
        }
        if root.deps.contains_key(&dep.name) {
            return Err(SpecError::DuplicateDependency(dep.name));
        }
        root.deps.insert(dep.name.clone(), dep);
    }
    Ok(root)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

const ARCH_KEYS: &[&str] = &["arch", "platform", "os", "target", "gpu_arch"];

impl<'a> Parser<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Skip whitespace; report whether any was skipped.
    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.bump();
        }
        self.pos > start
    }

    fn unexpected(&self) -> SpecError {
        let found = if self.at_end() {
            "end of input".to_string()
        } else {
            let rest = &self.src[self.pos..];
            rest.chars().take(12).collect()
        };
        SpecError::Unexpected {
            pos: self.pos,
            found,
        }
    }

    fn is_word_byte(b: u8) -> bool {
        b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'-'
    }

    /// A word: identifiers and package names (`py-numpy`, `libelf`).
    fn word(&mut self) -> &'a str {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if Self::is_word_byte(b)) {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn require_word(&mut self) -> Result<&'a str, SpecError> {
        let w = self.word();
        if w.is_empty() {
            return Err(self.unexpected());
        }
        Ok(w)
    }

    /// A version token: digits, dots, and range colons (`1.2:1.4rc1`).
    fn version_token(&mut self) -> &'a str {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(b) if b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b':'
        ) {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    /// A variant/arch value: like a word, but commas are allowed for lists.
    fn value_token(&mut self) -> &'a str {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if Self::is_word_byte(b) || b == b',') {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    /// Parse one spec (name plus specifiers), stopping at `^` or end of input.
    fn parse_one(&mut self) -> Result<Spec, SpecError> {
        self.skip_ws();
        let mut spec = Spec::new("");

        // Leading name, unless the first token turns out to be `key=value`.
        // Names start with a letter, digit, or underscore; a leading dash is
        // a variant-disable sigil.
        if matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            let start = self.pos;
            let w = self.word();
            if self.peek() == Some(b'=') {
                self.pos = start;
            } else {
                spec.name = w.to_string();
            }
        }

        loop {
            self.skip_ws();
            let at_boundary =
                self.pos == 0 || self.src.as_bytes()[self.pos - 1].is_ascii_whitespace();
            match self.peek() {
                None | Some(b'^') => break,
                Some(b'@') => {
                    self.bump();
                    if spec.version.is_some() {
                        return Err(SpecError::DuplicateVersion);
                    }
                    let tok = self.version_token();
                    spec.version = Some(tok.parse::<VersionReq>()?);
                }
                Some(b'%') => {
                    self.bump();
                    if spec.compiler.is_some() {
                        return Err(SpecError::DuplicateCompiler);
                    }
                    let name = self.require_word()?.to_string();
                    let version = if self.eat(b'@') {
                        Some(self.version_token().parse::<VersionReq>()?)
                    } else {
                        None
                    };
                    spec.compiler = Some(Compiler { name, version });
                }
                Some(b'+') => {
                    self.bump();
                    let name = self.require_word()?;
                    spec.set_variant(name, VariantValue::Bool(true))?;
                }
                Some(b'~') => {
                    self.bump();
                    let name = self.require_word()?;
                    spec.set_variant(name, VariantValue::Bool(false))?;
                }
                // `-qt` disables a variant, but only at a token boundary:
                // inside a word a dash is part of the name (`py-numpy`).
                Some(b'-') if at_boundary => {
                    self.bump();
                    let name = self.require_word()?;
                    spec.set_variant(name, VariantValue::Bool(false))?;
                }
                Some(b) if Self::is_word_byte(b) => {
                    let key = self.require_word()?;
                    if !self.eat(b'=') {
                        return Err(self.unexpected());
                    }
                    let value = self.value_token();
                    if value.is_empty() {
                        return Err(self.unexpected());
                    }
                    if ARCH_KEYS.contains(&key) {
                        spec.arch.merge(parse_arch_value(key, value)?)?;
                    } else {
                        let parsed = if value.contains(',') {
                            VariantValue::List(
                                value.split(',').map(|s| s.to_string()).collect(),
                            )
                        } else {
                            VariantValue::Single(value.to_string())
                        };
                        spec.set_variant(key, parsed)?;
                    }
                }
                Some(_) => return Err(self.unexpected()),
            }
        }
        Ok(spec)
    }
}

/// Build the arch contribution of one reserved `key=value` pair.
fn parse_arch_value(key: &str, value: &str) -> Result<ArchSpec, SpecError> {
    // The literal `nil` leaves a component unset.
    fn part(v: &str) -> Option<String> {
        if v == "nil" {
            None
        } else {
            Some(v.to_string())
        }
    }

    let mut arch = ArchSpec::default();
    match key {
        "platform" => arch.platform = part(value),
        "os" => arch.os = part(value),
        "target" => arch.cpu = part(value),
        "gpu_arch" => arch.gpu = part(value),
        "arch" => {
            let parts: Vec<&str> = value.split('-').collect();
            if parts.len() != 3 && parts.len() != 4 {
                return Err(SpecError::InvalidArch(value.to_string()));
            }
            arch.platform = part(parts[0]);
            arch.os = part(parts[1]);
            arch.cpu = part(parts[2]);
            arch.gpu = parts.get(3).and_then(|p| part(p));
        }
        _ => unreachable!("caller checked ARCH_KEYS"),
    }
    Ok(arch)
}

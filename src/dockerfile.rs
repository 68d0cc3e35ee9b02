//! Minimal Dockerfile reader.
//!
//! Enough of the format to validate structure and feed the heuristics:
//! parser directives, comments, line continuations and instruction
//! keywords. Arguments are kept verbatim.

/// One logical instruction, continuations joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Upper-cased keyword, e.g. `FROM`.
    pub keyword: String,
    pub args: String,
    /// 1-based line the instruction starts on.
    pub line: usize,
}

impl Instruction {
    pub fn is(&self, keyword: &str) -> bool {
        self.keyword == keyword
    }
}

const KEYWORDS: &[&str] = &[
    "ADD", "ARG", "CMD", "COPY", "ENTRYPOINT", "ENV", "EXPOSE", "FROM", "HEALTHCHECK", "LABEL",
    "MAINTAINER", "ONBUILD", "RUN", "SHELL", "STOPSIGNAL", "USER", "VOLUME", "WORKDIR",
];

/// Split content into logical instructions.
pub fn parse(content: &str) -> Vec<Instruction> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.starts_with('#') || (line.is_empty() && pending.is_none()) {
            continue;
        }
        let (body, continued) = match line.strip_suffix('\\') {
            Some(b) => (b.trim_end(), true),
            None => (line, false),
        };
        let (start, mut text) = pending.take().unwrap_or((idx + 1, String::new()));
        if !text.is_empty() && !body.is_empty() {
            text.push(' ');
        }
        text.push_str(body);

        if continued {
            pending = Some((start, text));
        } else if !text.is_empty() {
            out.push(split(start, &text));
        }
    }
    if let Some((start, text)) = pending
        && !text.is_empty()
    {
        out.push(split(start, &text));
    }
    out
}

fn split(line: usize, text: &str) -> Instruction {
    let (keyword, args) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    Instruction {
        keyword: keyword.to_ascii_uppercase(),
        args: args.trim().to_string(),
        line,
    }
}

/// Check the structure every Dockerfile needs.
///
/// Content must be non-empty, every keyword must be known, and the first
/// instruction other than `ARG` must be `FROM`.
pub fn validate(content: &str) -> std::result::Result<(), String> {
    let instructions = parse(content);
    let Some(first) = instructions.iter().find(|i| !i.is("ARG")) else {
        return Err("no instructions".to_string());
    };
    if let Some(bad) = instructions
        .iter()
        .find(|i| !KEYWORDS.contains(&i.keyword.as_str()))
    {
        return Err(format!("unknown instruction '{}' on line {}", bad.keyword, bad.line));
    }
    if !first.is("FROM") {
        return Err(format!(
            "first instruction must be FROM, found '{}' on line {}",
            first.keyword, first.line
        ));
    }
    Ok(())
}

/// Image references of every `FROM`, in order.
pub fn base_images(instructions: &[Instruction]) -> Vec<&str> {
    instructions
        .iter()
        .filter(|i| i.is("FROM"))
        .filter_map(|i| {
            i.args
                .split_whitespace()
                .find(|tok| !tok.starts_with("--"))
        })
        .collect()
}

/// Image the final stage runs on.
pub fn final_image(instructions: &[Instruction]) -> Option<&str> {
    base_images(instructions).last().copied()
}

/// User the final stage runs as, if set.
pub fn final_user(instructions: &[Instruction]) -> Option<&str> {
    let last_from = instructions.iter().rposition(|i| i.is("FROM"))?;
    instructions[last_from..]
        .iter()
        .rev()
        .find(|i| i.is("USER"))
        .map(|i| i.args.as_str())
}

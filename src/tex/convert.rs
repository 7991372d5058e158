//! LaTeX document assembly and text projections
//!
//! The model returns a LaTeX document of uncertain shape; we isolate its
//! body, strip any table of contents it produced despite instructions, and
//! wrap the body in our fixed preamble. The reverse direction
//! (`tex_to_plain_text` / `tex_to_markdown`) is a lossy, deterministic
//! pattern substitution used for search indexing and export; it is not
//! round-trip safe.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static RE_BODY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\\begin\{document\}(.*)\\end\{document\}").unwrap());
static RE_TOC_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\tableofcontents\b.*?\n").unwrap());
static RE_TOC_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)\A\s*\\section\*?\{\s*(?:Содержание|Contents)\s*\}.*?(?:\\newpage|\\clearpage)\s*",
    )
    .unwrap()
});
static RE_TOC_LIST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)\A\s*(?:Содержание|Contents)\s*\n\s*(?:\\begin\{itemize\}.*?\\end\{itemize\}|\\begin\{enumerate\}.*?\\end\{enumerate\})\s*(?:\\newpage|\\clearpage)\s*",
    )
    .unwrap()
});

static RE_SECTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\section\{([^{}]*)\}").unwrap());
static RE_SUBSECTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\subsection\{([^{}]*)\}").unwrap());
static RE_SUBSUBSECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\subsubsection\{([^{}]*)\}").unwrap());
static RE_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\href\{([^{}]*)\}\{([^{}]*)\}").unwrap());
static RE_TEXTBF: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\textbf\{([^{}]*)\}").unwrap());
static RE_TEXTIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\textit\{([^{}]*)\}").unwrap());
static RE_EMPH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\emph\{([^{}]*)\}").unwrap());
static RE_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\item\s*").unwrap());
static RE_COMMAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\[a-zA-Z]+\*?(?:\[[^\]]*\])?").unwrap());
static RE_BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

static RE_BLOCK_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n+").unwrap());
static RE_BULLET_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[-\u{2022}*]\s+(.+)$").unwrap());
static RE_NUMBERED_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+[.)]\s+(.+)$").unwrap());
static RE_SPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());

/// Escape reserved LaTeX characters in literal text.
pub fn escape_tex(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str(r"\textbackslash{}"),
            '&' => out.push_str(r"\&"),
            '%' => out.push_str(r"\%"),
            '$' => out.push_str(r"\$"),
            '#' => out.push_str(r"\#"),
            '_' => out.push_str(r"\_"),
            '{' => out.push_str(r"\{"),
            '}' => out.push_str(r"\}"),
            '~' => out.push_str(r"\textasciitilde{}"),
            '^' => out.push_str(r"\textasciicircum{}"),
            _ => out.push(ch),
        }
    }
    out
}

/// Content between \begin{document} and \end{document}; the whole input
/// when the markers are absent.
pub fn extract_body(tex: &str) -> String {
    match RE_BODY.captures(tex) {
        Some(caps) => caps[1].trim().to_string(),
        None => tex.trim().to_string(),
    }
}

/// Strip table-of-contents directives and a leading manually-authored
/// "Contents" section. The wrapper adds its own ToC, so one produced by the
/// model would end up duplicated.
pub fn sanitize_body(body: &str) -> String {
    let body = RE_TOC_LINE.replace_all(body, "");
    let body = RE_TOC_SECTION.replace(&body, "");
    let body = RE_TOC_LIST.replace(&body, "");
    body.trim().to_string()
}

const PREAMBLE: &str = r"\documentclass[12pt]{article}
\usepackage[a4paper,margin=2.5cm]{geometry}
\usepackage{fontspec}
\usepackage{polyglossia}
\setmainlanguage{russian}
\setotherlanguage{english}
\setmainfont{DejaVu Serif}
\usepackage{microtype}
\usepackage{setspace}
\setstretch{1.12}
\usepackage{parskip}
\setlength{\parindent}{0pt}
\usepackage{hyperref}
\hypersetup{colorlinks=true, linkcolor=blue, urlcolor=blue}
\usepackage{enumitem}
\setlist{nosep}
\usepackage{bookmark}";

/// Wrap a body in the fixed preamble, with an optional generated ToC.
pub fn wrap_full_document(body: &str, toc: bool) -> String {
    let body = sanitize_body(body);
    let toc_block = if toc { "\\tableofcontents\\newpage\n\n" } else { "" };

    format!("{PREAMBLE}\n\n\\begin{{document}}\n{toc_block}{body}\n\n\\end{{document}}\n")
}

#[derive(Clone, Copy, PartialEq)]
enum RenderStyle {
    Plain,
    Markdown,
}

/// Lossy plain-text projection of a LaTeX document.
pub fn tex_to_plain_text(tex: &str) -> String {
    render(tex, RenderStyle::Plain)
}

/// Lossy Markdown projection of a LaTeX document.
pub fn tex_to_markdown(tex: &str) -> String {
    render(tex, RenderStyle::Markdown)
}

fn render(tex: &str, style: RenderStyle) -> String {
    let mut s = extract_body(tex);
    s = strip_comments(&s);

    let (h1, h2, h3) = match style {
        RenderStyle::Plain => ("", "", ""),
        RenderStyle::Markdown => ("# ", "## ", "### "),
    };
    s = RE_SECTION
        .replace_all(&s, |caps: &Captures| format!("\n\n{h1}{}\n\n", &caps[1]))
        .to_string();
    s = RE_SUBSECTION
        .replace_all(&s, |caps: &Captures| format!("\n\n{h2}{}\n\n", &caps[1]))
        .to_string();
    s = RE_SUBSUBSECTION
        .replace_all(&s, |caps: &Captures| format!("\n\n{h3}{}\n\n", &caps[1]))
        .to_string();

    s = match style {
        RenderStyle::Plain => replace_to_fixpoint(&s, &RE_HREF, |caps| caps[2].to_string()),
        RenderStyle::Markdown => replace_to_fixpoint(&s, &RE_HREF, |caps| {
            format!("[{}]({})", &caps[2], &caps[1])
        }),
    };

    let (bold, italic) = match style {
        RenderStyle::Plain => ("", ""),
        RenderStyle::Markdown => ("**", "*"),
    };
    s = replace_to_fixpoint(&s, &RE_TEXTBF, |caps| format!("{bold}{}{bold}", &caps[1]));
    s = replace_to_fixpoint(&s, &RE_TEXTIT, |caps| format!("{italic}{}{italic}", &caps[1]));
    s = replace_to_fixpoint(&s, &RE_EMPH, |caps| format!("{italic}{}{italic}", &caps[1]));

    for env in ["itemize", "enumerate"] {
        s = s.replace(&format!("\\begin{{{env}}}"), "");
        s = s.replace(&format!("\\end{{{env}}}"), "");
    }
    s = RE_ITEM.replace_all(&s, "\n- ").to_string();

    s = s.replace("\\\\", "\n");
    s = s.replace("\\par", "\n\n");

    s = s.replace(['{', '}'], "");
    s = RE_COMMAND.replace_all(&s, "").to_string();

    s = s
        .replace(r"\&", "&")
        .replace(r"\%", "%")
        .replace(r"\_", "_")
        .replace(r"\#", "#")
        .replace(r"\$", "$");

    RE_BLANK_RUNS.replace_all(&s, "\n\n").trim().to_string()
}

/// Repeat a substitution until it stops matching, so nested occurrences
/// like \textbf{a \textbf{b}} all unwrap.
fn replace_to_fixpoint(s: &str, re: &Regex, repl: impl Fn(&Captures) -> String) -> String {
    let mut current = s.to_string();
    loop {
        let next = re.replace_all(&current, |caps: &Captures| repl(caps)).to_string();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Drop unescaped %-comments, line by line.
fn strip_comments(s: &str) -> String {
    s.lines()
        .map(|line| {
            let mut out = String::new();
            let mut prev = '\0';
            for ch in line.chars() {
                if ch == '%' && prev != '\\' {
                    break;
                }
                out.push(ch);
                prev = ch;
            }
            out
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Deterministic plain-text to LaTeX body conversion.
///
/// No wording changes: paragraphs join their wrapped lines, a block where
/// every line looks like a bullet or numbered item (at least two lines)
/// becomes a list construct, and all literal text is escaped.
pub fn text_to_tex_body(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut parts: Vec<String> = Vec::new();

    for block in RE_BLOCK_SPLIT.split(text.trim()) {
        let lines: Vec<&str> = block
            .lines()
            .map(|line| line.trim_end())
            .filter(|line| !line.trim().is_empty())
            .collect();
        if lines.is_empty() {
            continue;
        }

        if lines.len() >= 2 {
            if let Some(items) = match_all_lines(&lines, &RE_BULLET_LINE) {
                parts.push(list_env("itemize", &items));
                continue;
            }
            if let Some(items) = match_all_lines(&lines, &RE_NUMBERED_LINE) {
                parts.push(list_env("enumerate", &items));
                continue;
            }
        }

        let joined = lines.join(" ");
        let collapsed = RE_SPACE_RUNS.replace_all(&joined, " ");
        parts.push(escape_tex(collapsed.trim()));
    }

    parts.join("\n\n").trim().to_string()
}

fn match_all_lines(lines: &[&str], re: &Regex) -> Option<Vec<String>> {
    lines
        .iter()
        .map(|line| re.captures(line).map(|caps| caps[1].trim().to_string()))
        .collect()
}

fn list_env(env: &str, items: &[String]) -> String {
    let mut out = vec![format!("\\begin{{{env}}}")];
    out.extend(items.iter().map(|item| format!("\\item {}", escape_tex(item))));
    out.push(format!("\\end{{{env}}}"));
    out.join("\n")
}

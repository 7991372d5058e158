//! Prompt construction for the rewrite service

/// System prompt for the editing rewrite.
pub const EDITOR_SYSTEM_PROMPT: &str = "You are an experienced document editor. \
Improve the text according to the requirements and return a LaTeX document. \
Preserve the meaning and content of the text. Do not invent facts. \
Return only LaTeX.";

/// System prompt for the single compile-repair round.
pub const REPAIR_SYSTEM_PROMPT: &str = "Fix the LaTeX so that it compiles. \
Do not change the meaning of the text. Return only the corrected LaTeX document.";

fn requirement(enabled: bool, what: &str) -> String {
    let verb = if enabled { "Required" } else { "Forbidden" };
    format!("{verb}: {what}")
}

fn build_requirements(toc: bool, structure: bool, spelling: bool) -> String {
    [
        requirement(spelling, "check and correct spelling and punctuation"),
        requirement(structure, "improve structure: spacing, line breaks, indentation"),
        requirement(toc, "table of contents"),
    ]
    .join("\n")
}

/// User prompt for the editing rewrite, encoding the selected edit options
/// and a free-text override instruction.
pub fn build_user_prompt(
    input: &str,
    is_tex: bool,
    toc: bool,
    structure: bool,
    spelling: bool,
    extra: &str,
) -> String {
    let requirements = build_requirements(toc, structure, spelling);
    let extra_line = format!(
        "Required: if anything here contradicts the statements above, follow this instead: \"{extra}\""
    );
    let format_rules = "\n\nOUTPUT FORMAT:\n\
Return only a LaTeX (.tex) document. No explanations, no code fences.\n\
The document must compile with LuaLaTeX/XeLaTeX.\n\
Use \\section / \\subsection where appropriate.\n\
If 'table of contents' is required: do NOT insert \\tableofcontents and do NOT build one manually \
(no separate Contents section, no list of links). Just mark headings with \\section/\\subsection; \
the system adds the table of contents itself.\n\
If 'table of contents' is forbidden: do NOT insert \\tableofcontents and do NOT add a manual Contents section.\n";
    let header = if is_tex {
        "INPUT (LaTeX)"
    } else {
        "INPUT (TEXT)"
    };

    format!(
        "EDITING REQUIREMENTS:\n{requirements}\n\nEXTRA:\n{extra_line}{format_rules}\n\n{header}:\n<<<\n{input}\n>>>\n"
    )
}

/// User prompt for the repair round: the compiler diagnostic plus the full
/// failed source.
pub fn build_repair_prompt(diagnostic: &str, failed_source: &str) -> String {
    format!("COMPILE ERROR:\n{diagnostic}\n\nCURRENT LaTeX:\n<<<\n{failed_source}\n>>>\n")
}

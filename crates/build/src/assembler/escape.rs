/// Escape text for use in LaTeX body text.
///
/// Tabs become spaces; other control characters are expected to have been
/// rejected already.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str(r"\textbackslash{}"),
            '^' => escaped.push_str(r"\textasciicircum{}"),
            '~' => escaped.push_str(r"\textasciitilde{}"),
            '{' | '}' | '$' | '&' | '#' | '_' | '%' => {
                escaped.push('\\');
                escaped.push(c);
            },
            '\t' => escaped.push(' '),
            c => escaped.push(c),
        }
    }
    escaped
}

use anyhow::{Context, Result};
use std::io::{BufRead, Write};

/// Asks a yes/no question; only `y` (any case, surrounding blanks ignored)
/// confirms. End of input counts as no.
pub fn confirm<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> Result<bool> {
    write!(output, "{question} (y/n): ").context("writing prompt")?;
    output.flush().context("flushing prompt")?;

    let mut answer = String::new();
    let read = input.read_line(&mut answer).context("reading answer")?;
    if read == 0 {
        writeln!(output).context("writing prompt")?;
        return Ok(false);
    }
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

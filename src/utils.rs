use std::io::{self, BufRead, Write};

/// Ask for a series URL until something non-empty is typed
pub fn get_user_input() -> io::Result<String> {
    let stdin = io::stdin();
    loop {
        print!("MangaHere url: ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "no url given"));
        }
        let url = line.trim();
        if !url.is_empty() {
            return Ok(url.to_string());
        }
    }
}

/// `[Y/n]` / `[y/N]` prompt; an empty answer picks `default`
pub fn yes_no_prompt(prompt: &str, default: bool) -> io::Result<bool> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    read_yes_no(&mut input, &mut output, prompt, default)
}

fn read_yes_no<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    prompt: &str,
    default: bool,
) -> io::Result<bool> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    loop {
        write!(output, "{} {} ", prompt, hint)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(default);
        }
        match line.trim().to_lowercase().as_str() {
            "" => return Ok(default),
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(typed: &str, default: bool) -> bool {
        let mut input = io::Cursor::new(typed.as_bytes().to_vec());
        let mut output = Vec::new();
        read_yes_no(&mut input, &mut output, "Start?", default).unwrap()
    }

    #[test]
    fn empty_answer_takes_default() {
        assert!(answer("\n", true));
        assert!(!answer("\n", false));
    }

    #[test]
    fn unknown_answers_ask_again() {
        assert!(!answer("maybe\nNO\n", true));
        assert!(answer("what\nYes\n", false));
    }
}

//! User interaction during plan confirmation

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

use async_trait::async_trait;

use crate::error::Result;

/// Where a plan prints its stage messages and asks for confirmation
#[async_trait]
pub trait Console: Send {
    fn emit(&mut self, line: &str);

    /// Ask a question; `None` means the input is exhausted
    async fn ask(&mut self, question: &str) -> Result<Option<String>>;
}

/// Console bound to the process's stdin and stdout
#[derive(Debug, Default)]
pub struct TerminalConsole;

#[async_trait]
impl Console for TerminalConsole {
    fn emit(&mut self, line: &str) {
        println!("{}", line);
    }

    async fn ask(&mut self, question: &str) -> Result<Option<String>> {
        print!("{}", question);
        io::stdout().flush()?;

        let answer = tokio::task::spawn_blocking(|| -> io::Result<Option<String>> {
            let mut line = String::new();
            let read = io::stdin().lock().read_line(&mut line)?;
            Ok((read > 0).then_some(line))
        })
        .await
        .map_err(io::Error::other)??;
        Ok(answer)
    }
}

/// Console fed from a fixed list of answers, recording everything shown
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    answers: VecDeque<String>,
    transcript: Vec<String>,
}

impl ScriptedConsole {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            transcript: Vec::new(),
        }
    }

    /// Lines emitted and questions asked, in order
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    pub fn questions_asked(&self) -> usize {
        self.transcript.iter().filter(|l| l.starts_with("? ")).count()
    }
}

#[async_trait]
impl Console for ScriptedConsole {
    fn emit(&mut self, line: &str) {
        self.transcript.push(line.to_string());
    }

    async fn ask(&mut self, question: &str) -> Result<Option<String>> {
        self.transcript.push(format!("? {}", question.trim_end()));
        Ok(self.answers.pop_front())
    }
}

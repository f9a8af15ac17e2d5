use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use log::{info, warn};

use crate::credentials::{AuthKind, Credentials};
use crate::error::StageError;
use crate::orchestrator::{RecordEntry, RecordKey, RecordSet, UpdateReport};
use crate::wizard::{Operator, Stage};

/// Interactive prompts on a line-oriented terminal.
pub struct Terminal<R, W> {
    input: R,
    output: W,
}

impl Terminal<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Terminal<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, prompt: &str) -> Result<String> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .context("Failed to read from terminal")?;
        if read == 0 {
            bail!("Input closed");
        }
        Ok(line.trim().to_string())
    }

    /// Shows `labels` as a numbered list and asks until the answer parses.
    fn choose(&mut self, heading: &str, labels: &[String]) -> Result<Vec<usize>> {
        writeln!(self.output, "{}", heading)?;
        for (i, label) in labels.iter().enumerate() {
            writeln!(self.output, "  [{}] {}", i + 1, label)?;
        }
        loop {
            let answer = self.ask("Numbers separated by spaces or commas, or 'all': ")?;
            match parse_selection(&answer, labels.len()) {
                Ok(picked) => return Ok(picked),
                Err(message) => writeln!(self.output, "{}", message)?,
            }
        }
    }
}

impl<R: BufRead, W: Write> Operator for Terminal<R, W> {
    fn credentials(&mut self) -> Result<Credentials> {
        let email = self.ask("Cloudflare email: ")?;
        let key = self.ask("Cloudflare API key: ")?;
        writeln!(self.output, "API key type:")?;
        writeln!(self.output, "  [1] Global API Key")?;
        writeln!(self.output, "  [2] API Token (DNS Access)")?;
        let kind = loop {
            match self.ask("Key type [1]: ")?.as_str() {
                "" | "1" => break AuthKind::GlobalKey,
                "2" => break AuthKind::ApiToken,
                other => writeln!(self.output, "Unknown key type: {}", other)?,
            }
        };
        Ok(Credentials::new(email, key, kind))
    }

    fn choose_domains(&mut self, domains: &[String]) -> Result<Vec<String>> {
        let picked = self.choose("Select domains to update DNS for:", domains)?;
        Ok(picked.into_iter().map(|i| domains[i].clone()).collect())
    }

    fn choose_records(&mut self, records: &RecordSet) -> Result<Vec<RecordKey>> {
        let entries: Vec<RecordEntry> = records.entries().collect();
        let labels: Vec<String> = entries
            .iter()
            .map(|entry| format!("{} ({})", entry.name, entry.domain))
            .collect();
        let picked = self.choose("Select DNS records to update:", &labels)?;
        Ok(picked.into_iter().map(|i| entries[i].key()).collect())
    }

    fn rejected(&mut self, stage: Stage, error: &StageError) -> Result<()> {
        writeln!(self.output, "Error! {}", error)?;
        if stage == Stage::Update {
            let answer = self.ask("Try again? [Y/n]: ")?;
            if answer.eq_ignore_ascii_case("n") || answer.eq_ignore_ascii_case("no") {
                bail!("{}", error);
            }
        }
        Ok(())
    }

    fn finished(&mut self, report: &UpdateReport) {
        if let Err(e) = writeln!(self.output, "{}", report) {
            warn!("Failed to print report: {}", e);
        }
    }
}

/// Parses 1-based picks such as `1 3`, `2,4` or `all` into 0-based indices,
/// dropping repeats. An empty answer is an empty selection.
pub fn parse_selection(answer: &str, count: usize) -> Result<Vec<usize>, String> {
    let answer = answer.trim();
    if answer.eq_ignore_ascii_case("all") {
        return Ok((0..count).collect());
    }

    let mut picked = Vec::new();
    for token in answer
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
    {
        let number: usize = token
            .parse()
            .map_err(|_| format!("Not a number: {}", token))?;
        if number == 0 || number > count {
            return Err(format!("Choose between 1 and {}: got {}", count, number));
        }
        if !picked.contains(&(number - 1)) {
            picked.push(number - 1);
        }
    }
    Ok(picked)
}

/// Answers the wizard from command-line flags. Any rejection ends the run
/// since there is nobody to re-prompt.
pub struct Headless {
    domains: Vec<String>,
    records: Vec<String>,
}

impl Headless {
    pub fn new(domains: Vec<String>, records: Vec<String>) -> Self {
        Self { domains, records }
    }
}

impl Operator for Headless {
    fn credentials(&mut self) -> Result<Credentials> {
        bail!("No usable credentials: pass --email and --key, or save them with an interactive run")
    }

    fn choose_domains(&mut self, _domains: &[String]) -> Result<Vec<String>> {
        Ok(self.domains.clone())
    }

    /// Every record with a requested name is picked, in whichever selected
    /// zone it lives.
    fn choose_records(&mut self, records: &RecordSet) -> Result<Vec<RecordKey>> {
        let mut keys = Vec::new();
        for name in &self.records {
            let matches: Vec<RecordKey> = records
                .entries()
                .filter(|entry| &entry.name == name)
                .map(|entry| entry.key())
                .collect();
            if matches.is_empty() {
                bail!("DNS record {} is not under the selected domains", name);
            }
            if matches.len() > 1 {
                warn!("DNS record {} exists in {} zones, updating all of them", name, matches.len());
            }
            keys.extend(matches);
        }
        Ok(keys)
    }

    fn rejected(&mut self, _stage: Stage, error: &StageError) -> Result<()> {
        bail!("{}", error)
    }

    fn finished(&mut self, report: &UpdateReport) {
        info!("{}", report);
    }
}

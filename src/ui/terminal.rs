//! Interactive operator backed by dialoguer prompts.

use crate::approval::{ForcedChoice, Reviewer, Round, Verdict};
use crate::operator::Prompter;
use crate::ui::Console;
use anyhow::Result;
use dialoguer::{Confirm, Input, Select, theme::ColorfulTheme};

pub struct TerminalOperator {
    console: Console,
}

impl TerminalOperator {
    pub fn new(console: Console) -> Self {
        Self { console }
    }
}

impl Reviewer for TerminalOperator {
    fn round_started(&self, round: &Round<'_>) {
        self.console.iteration(round.iteration, round.max_iterations);
    }

    fn decide(&self, round: &Round<'_>) -> Result<Verdict> {
        let options = &["Accept", "Request changes"];
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Review {} ({}/{})", round.step, round.iteration, round.max_iterations))
            .items(options)
            .default(0)
            .interact()?;
        Ok(if selection == 0 {
            Verdict::Accept
        } else {
            Verdict::Revise
        })
    }

    fn feedback(&self, _round: &Round<'_>) -> Result<String> {
        let text: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("What should change?")
            .allow_empty(true)
            .interact_text()?;
        Ok(text)
    }

    fn feedback_rejected(&self, _round: &Round<'_>, reason: &str) {
        self.console.warning(reason);
    }

    fn force(&self, round: &Round<'_>) -> Result<ForcedChoice> {
        self.console.warning(&format!(
            "Reached {} revisions for {}. Choose how to proceed.",
            round.max_iterations, round.step
        ));
        let options = &[
            "Accept the next version as-is",
            "Skip this step",
        ];
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Iteration limit reached")
            .items(options)
            .default(0)
            .interact()?;
        Ok(if selection == 0 {
            ForcedChoice::Accept
        } else {
            ForcedChoice::Skip
        })
    }
}

impl Prompter for TerminalOperator {
    fn text(&self, prompt: &str, default: Option<&str>) -> Result<String> {
        let theme = ColorfulTheme::default();
        let mut input = Input::<String>::with_theme(&theme)
            .with_prompt(prompt)
            .allow_empty(default.is_some());
        if let Some(default) = default.filter(|d| !d.is_empty()) {
            input = input.default(default.to_string());
        }
        Ok(input.interact_text()?)
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        Ok(Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(default)
            .interact()?)
    }

    fn select(&self, prompt: &str, items: &[String], default: usize) -> Result<usize> {
        Ok(Select::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .items(items)
            .default(default.min(items.len().saturating_sub(1)))
            .interact()?)
    }
}

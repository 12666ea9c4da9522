//! Scripted [`CommandRunner`] for backend tests.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::Result;
use crate::vcs::process::{CmdOutput, CommandRunner, Invocation};

struct Rule {
    prefix: String,
    output: CmdOutput,
    once: bool,
}

type Effect = Box<dyn Fn(&Invocation) + Send + Sync>;

/// Records every invocation and answers from a list of prefix rules.
///
/// Rules are matched in registration order against the rendered command line
/// (`git commit -m msg`); `once` rules are consumed by their first match.
/// Unmatched commands succeed with empty output. Effects registered with
/// [`FakeRunner::on`] run before the answer, e.g. to create the files a real
/// clone would check out.
#[derive(Default)]
pub struct FakeRunner {
    rules: Mutex<Vec<Rule>>,
    effects: Mutex<Vec<(String, Effect)>>,
    calls: Mutex<Vec<Invocation>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, prefix: &str, output: CmdOutput, once: bool) {
        self.rules.lock().unwrap().push(Rule {
            prefix: prefix.to_string(),
            output,
            once,
        });
    }

    pub fn stdout(&self, prefix: &str, stdout: &str) -> &Self {
        self.push(prefix, ok(stdout), false);
        self
    }

    pub fn stdout_once(&self, prefix: &str, stdout: &str) -> &Self {
        self.push(prefix, ok(stdout), true);
        self
    }

    pub fn fail(&self, prefix: &str, stderr: &str) -> &Self {
        self.push(
            prefix,
            CmdOutput {
                code: Some(1),
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
            false,
        );
        self
    }

    pub fn on(&self, prefix: &str, effect: impl Fn(&Invocation) + Send + Sync + 'static) -> &Self {
        self.effects
            .lock()
            .unwrap()
            .push((prefix.to_string(), Box::new(effect)));
        self
    }

    /// Rendered command lines, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|i| i.to_string())
            .collect()
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }

    fn answer(&self, inv: &Invocation) -> CmdOutput {
        self.calls.lock().unwrap().push(inv.clone());
        let line = inv.to_string();
        for (prefix, effect) in self.effects.lock().unwrap().iter() {
            if line.starts_with(prefix.as_str()) {
                effect(inv);
            }
        }
        let mut rules = self.rules.lock().unwrap();
        let Some(idx) = rules.iter().position(|r| line.starts_with(&r.prefix)) else {
            return ok("");
        };
        if rules[idx].once {
            rules.remove(idx).output
        } else {
            rules[idx].output.clone()
        }
    }
}

fn ok(stdout: &str) -> CmdOutput {
    CmdOutput {
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, inv: &Invocation) -> Result<CmdOutput> {
        Ok(self.answer(inv))
    }

    fn run_blocking(&self, inv: &Invocation) -> Result<CmdOutput> {
        Ok(self.answer(inv))
    }
}

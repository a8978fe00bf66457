//! Shared test harness: a scripted transport that answers writer,
//! philosopher, and rewriter prompts deterministically without a network.
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::Mutex;

use examsmith::core::llm_transport::{LlmRequest, LlmTransport};
use examsmith::core::parser::END_OF_PROBLEM;

/// How the mock writer behaves for a run.
#[derive(Debug, Clone)]
pub enum WriterBehavior {
    /// Valid items for every requested slot.
    Clean,
    /// First writer call: `complete` whole items, then a cut-off tail.
    /// Later calls are clean.
    TruncateFirstCall { complete: usize },
    /// One slot's item answers by bare letter instead of full option text.
    LetterAnswer { slot_id: String },
    /// One slot's item ignores the topic; the rewriter never fixes it.
    PersistentlyOffTopic { slot_id: String },
    /// Every stem opens with a recall verb regardless of the target level.
    RecallVerbsOnly,
}

/// How the mock Philosopher judges every draft it is shown.
#[derive(Debug, Clone)]
pub enum PhilosopherScript {
    /// Complete, severity 1: straight to the accept branch.
    AlwaysComplete,
    /// Rewrite, severity 5, one culprit: the surgical branch.
    SurgicalOnce { slot_id: String },
    /// Rewrite, severity 9 on every review: restart until the bound.
    AlwaysRestart,
    /// Complete, severity 4 on every review: both reviews borderline.
    AlwaysMediocre,
}

/// One requested slot parsed back out of a writer group prompt.
struct SlotSpec {
    id: String,
    mcq: bool,
    bloom: String,
}

pub struct ScriptedTransport {
    pub behavior: WriterBehavior,
    pub philosopher: PhilosopherScript,
    writer_calls: Mutex<u32>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(behavior: WriterBehavior) -> Self {
        Self {
            behavior,
            philosopher: PhilosopherScript::AlwaysComplete,
            writer_calls: Mutex::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_philosopher(mut self, philosopher: PhilosopherScript) -> Self {
        self.philosopher = philosopher;
        self
    }

    pub fn writer_call_count(&self) -> u32 {
        *self.writer_calls.lock().unwrap()
    }

    fn parse_slots(prompt: &str) -> Vec<SlotSpec> {
        let header = Regex::new(r"\(id (slot-\d+)\): ([a-z/ ]+) item").unwrap();
        let bloom = Regex::new(r"target Bloom level: ([a-z]+)").unwrap();
        let mut specs = Vec::new();
        let mut bloom_iter = bloom.captures_iter(prompt);
        for caps in header.captures_iter(prompt) {
            let level = bloom_iter
                .next()
                .map(|b| b[1].to_string())
                .unwrap_or_else(|| "remember".to_string());
            specs.push(SlotSpec {
                id: caps[1].to_string(),
                mcq: caps[2].trim() == "multiple choice",
                bloom: level,
            });
        }
        specs
    }

    fn verb_for(level: &str) -> &'static str {
        match level {
            "remember" => "define",
            "understand" => "explain",
            "apply" => "solve",
            "analyze" => "analyze",
            "evaluate" => "evaluate",
            "create" => "design",
            _ => "identify",
        }
    }

    fn item_json(&self, spec: &SlotSpec) -> String {
        let verb = match &self.behavior {
            WriterBehavior::RecallVerbsOnly => "identify",
            _ => Self::verb_for(&spec.bloom),
        };
        let off_topic = matches!(
            &self.behavior,
            WriterBehavior::PersistentlyOffTopic { slot_id } if slot_id == &spec.id
        );
        let prompt = if off_topic {
            format!("In Pre-Algebra, {} the slope of the line y = 2x + 1.", verb)
        } else {
            format!(
                "In Pre-Algebra, {} the sum of 1/3 + 1/4 when adding unlike denominators.",
                verb
            )
        };
        let bloom = if matches!(self.behavior, WriterBehavior::RecallVerbsOnly) {
            "remember"
        } else {
            spec.bloom.as_str()
        };
        if spec.mcq {
            let answer = match &self.behavior {
                WriterBehavior::LetterAnswer { slot_id } if slot_id == &spec.id => "B",
                _ => "B. Find a common denominator",
            };
            serde_json::json!({
                "slotId": spec.id,
                "questionType": "multipleChoice",
                "prompt": prompt,
                "options": [
                    "A. Add the denominators",
                    "B. Find a common denominator",
                    "C. Multiply the numerators",
                    "D. Subtract the fractions",
                ],
                "answer": answer,
                "bloom": bloom,
            })
            .to_string()
        } else {
            serde_json::json!({
                "slotId": spec.id,
                "questionType": "shortAnswer",
                "prompt": prompt,
                "answer": "7/12",
                "bloom": bloom,
            })
            .to_string()
        }
    }

    fn writer_response(&self, prompt: &str) -> String {
        let call_index = {
            let mut calls = self.writer_calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        let specs = Self::parse_slots(prompt);
        match &self.behavior {
            WriterBehavior::TruncateFirstCall { complete } if call_index == 1 => {
                let mut out = String::new();
                for spec in specs.iter().take(*complete) {
                    out.push_str(&self.item_json(spec));
                    out.push_str(&format!("\n{}\n", END_OF_PROBLEM));
                }
                if let Some(next) = specs.get(*complete) {
                    out.push_str(&format!(
                        "{{\"slotId\": \"{}\", \"questionType\": \"mult",
                        next.id
                    ));
                }
                out
            }
            _ => {
                let mut out = String::new();
                for spec in &specs {
                    out.push_str(&self.item_json(spec));
                    out.push_str(&format!("\n{}\n", END_OF_PROBLEM));
                }
                out
            }
        }
    }

    fn rewriter_response(&self, prompt: &str) -> String {
        // The persistent offender stays off topic no matter how it is asked.
        if let WriterBehavior::PersistentlyOffTopic { slot_id } = &self.behavior {
            if prompt.contains(slot_id.as_str()) {
                return serde_json::json!({
                    "slotId": slot_id,
                    "questionType": "shortAnswer",
                    "prompt": "In Pre-Algebra, solve for the slope of y = 2x + 1.",
                    "answer": "2",
                })
                .to_string();
            }
        }
        // Instruction-driven revisions come back visibly reworked so tests
        // can tell the replacement from the original draft item.
        if prompt.contains("revising one question") {
            return serde_json::json!({
                "slotId": "slot-01",
                "questionType": "shortAnswer",
                "prompt": "In Pre-Algebra, solve 2/5 + 1/10 by adding unlike denominators.",
                "answer": "1/2",
            })
            .to_string();
        }
        serde_json::json!({
            "slotId": "slot-01",
            "questionType": "shortAnswer",
            "prompt": "In Pre-Algebra, solve the sum of 1/3 + 1/4 when adding unlike denominators.",
            "answer": "7/12",
        })
        .to_string()
    }
}

impl ScriptedTransport {
    fn philosopher_response(&self) -> String {
        match &self.philosopher {
            PhilosopherScript::AlwaysComplete => serde_json::json!({
                "status": "complete",
                "severity": 1,
                "narrativeSummary": "looks solid",
            }),
            PhilosopherScript::SurgicalOnce { slot_id } => serde_json::json!({
                "status": "rewrite",
                "severity": 5,
                "culpritProblems": [slot_id],
                "rewriteInstructions": [{
                    "problemId": slot_id,
                    "issues": ["stem too abstract for the grade band"],
                    "instructions": "ground the stem in a concrete fraction pair",
                }],
                "narrativeSummary": "one weak item",
            }),
            PhilosopherScript::AlwaysRestart => serde_json::json!({
                "status": "rewrite",
                "severity": 9,
                "narrativeSummary": "draft misses the topic broadly",
            }),
            PhilosopherScript::AlwaysMediocre => serde_json::json!({
                "status": "complete",
                "severity": 4,
                "narrativeSummary": "usable but flat",
            }),
        }
        .to_string()
    }
}

#[async_trait]
impl LlmTransport for ScriptedTransport {
    async fn call_one(&self, request: LlmRequest) -> Result<String> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        if request.prompt.contains("Judge the draft") {
            return Ok(self.philosopher_response());
        }
        if request.prompt.contains("surgically fixing")
            || request.prompt.contains("revising one question")
        {
            return Ok(self.rewriter_response(&request.prompt));
        }
        Ok(self.writer_response(&request.prompt))
    }
}

/// The Scenario A intent: grade 7 Pre-Algebra fractions quiz, 15 minutes.
pub fn quiz_intent() -> examsmith::core::intent::TeacherIntent {
    serde_json::from_value(serde_json::json!({
        "gradeLevels": ["7"],
        "course": "Pre-Algebra",
        "unitName": "Fractions",
        "topic": "adding unlike denominators",
        "studentLevel": "standard",
        "assessmentType": "quiz",
        "timeMinutes": 15
    }))
    .unwrap()
}

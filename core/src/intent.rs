//! Teacher Intent Module
//!
//! The compact request object a teacher submits to generate an assessment.
//! This is the sole input to the pipeline; everything else is derived.

use serde::{Deserialize, Serialize};

use crate::bloom::BloomLevel;

/// Student rigor band for the class the assessment targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum StudentLevel {
    Remedial,
    Standard,
    Honors,
    Ap,
}

impl std::fmt::Display for StudentLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StudentLevel::Remedial => "remedial",
            StudentLevel::Standard => "standard",
            StudentLevel::Honors => "honors",
            StudentLevel::Ap => "ap",
        };
        write!(f, "{}", s)
    }
}

/// Kind of classroom material being generated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum AssessmentType {
    BellRinger,
    ExitTicket,
    Quiz,
    Test,
    Worksheet,
    TestReview,
}

impl std::fmt::Display for AssessmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AssessmentType::BellRinger => "bell ringer",
            AssessmentType::ExitTicket => "exit ticket",
            AssessmentType::Quiz => "quiz",
            AssessmentType::Test => "test",
            AssessmentType::Worksheet => "worksheet",
            AssessmentType::TestReview => "test review",
        };
        write!(f, "{}", s)
    }
}

/// Teacher-chip question format preference.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum QuestionFormat {
    MultipleChoice,
    ShortAnswer,
    OpenEnded,
    TrueFalse,
    FillInTheBlank,
    Matching,
    Mixed,
}

/// Teacher preference for where the Bloom distribution should sit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BloomPreference {
    /// Weight toward remember/understand.
    Recall,
    /// Level mix appropriate to the student level.
    Balanced,
    /// Weight toward analyze and above.
    HigherOrder,
}

impl BloomPreference {
    /// Bloom level the preference centers the distribution on.
    pub fn center(self) -> BloomLevel {
        match self {
            BloomPreference::Recall => BloomLevel::Understand,
            BloomPreference::Balanced => BloomLevel::Apply,
            BloomPreference::HigherOrder => BloomLevel::Analyze,
        }
    }
}

/// Whether the assessment is a single run of questions or multiple sections.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SectionStructure {
    Single,
    Multiple,
}

/// Standards framework the teacher wants the items aligned to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StandardsAlignment {
    CommonCore,
    Ngss,
    Ap,
    StateStandards,
}

/// A reference document the teacher attached for grounding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceDocument {
    pub id: String,
    pub name: String,
    pub content: String,
}

/// A prior assessment the teacher supplied as a style example.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExampleAssessment {
    pub id: String,
    pub content: String,
}

/// The teacher's request: what to assess, for whom, and within what time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherIntent {
    /// Grade levels the class spans, e.g. `["7"]` or `["K", "1"]`.
    pub grade_levels: Vec<String>,
    /// Course name, e.g. "Pre-Algebra".
    pub course: String,
    /// Unit the assessment belongs to.
    pub unit_name: String,
    /// The topic being assessed.
    pub topic: String,
    pub student_level: StudentLevel,
    pub assessment_type: AssessmentType,
    /// Class time available for the assessment, in minutes.
    pub time_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_details: Option<String>,
    #[serde(default)]
    pub focus_areas: Vec<String>,
    /// Misconceptions each of which must be targeted by at least the stem text.
    #[serde(default)]
    pub misconceptions: Vec<String>,
    /// Phrases that must not appear in any prompt.
    #[serde(default)]
    pub avoid_list: Vec<String>,
    #[serde(default)]
    pub source_documents: Vec<SourceDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_assessment: Option<ExampleAssessment>,
    /// Teacher-fixed question count; overrides the time-derived count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_format: Option<QuestionFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bloom_preference: Option<BloomPreference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_structure: Option<SectionStructure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standards_alignment: Option<StandardsAlignment>,
    /// Account key for the defaults and subscription lookups at entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<String>,
}

impl TeacherIntent {
    /// Total characters of teacher-supplied context, used by the
    /// creation-time estimate.
    pub fn input_length(&self) -> usize {
        let mut len = self.course.len() + self.unit_name.len() + self.topic.len();
        len += self.lesson_name.as_deref().map(str::len).unwrap_or(0);
        len += self.additional_details.as_deref().map(str::len).unwrap_or(0);
        len += self.focus_areas.iter().map(String::len).sum::<usize>();
        len += self.misconceptions.iter().map(String::len).sum::<usize>();
        len += self
            .source_documents
            .iter()
            .map(|d| d.content.len())
            .sum::<usize>();
        len += self
            .example_assessment
            .as_ref()
            .map(|e| e.content.len())
            .unwrap_or(0);
        len
    }

    /// Lowest numeric grade in `grade_levels`; "K" counts as 0. Non-numeric
    /// entries other than K are ignored.
    pub fn min_grade(&self) -> Option<u32> {
        self.grade_levels
            .iter()
            .filter_map(|g| {
                let g = g.trim();
                if g.eq_ignore_ascii_case("k") {
                    Some(0)
                } else {
                    g.parse::<u32>().ok()
                }
            })
            .min()
    }

    /// Fill unset adaptive flags from stored defaults. Explicit intent values
    /// always win.
    pub fn merge_defaults(&mut self, defaults: &TeacherDefaults) {
        if self.question_format.is_none() {
            self.question_format = defaults.question_format;
        }
        if self.bloom_preference.is_none() {
            self.bloom_preference = defaults.bloom_preference;
        }
        if self.section_structure.is_none() {
            self.section_structure = defaults.section_structure;
        }
        if self.standards_alignment.is_none() {
            self.standards_alignment = defaults.standards_alignment;
        }
    }
}

/// Stored per-teacher preferences merged into the intent at pipeline entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_format: Option<QuestionFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bloom_preference: Option<BloomPreference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_structure: Option<SectionStructure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standards_alignment: Option<StandardsAlignment>,
}

/// Subscription tier, looked up at entry; gates the playtest branch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SubscriptionTier {
    Free,
    Tier1,
    Tier2,
    Admin,
}

impl SubscriptionTier {
    /// Whether this tier may run the Philosopher in playtest mode.
    pub fn allows_playtest(self) -> bool {
        matches!(self, SubscriptionTier::Tier2 | SubscriptionTier::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent() -> TeacherIntent {
        TeacherIntent {
            grade_levels: vec!["7".to_string()],
            course: "Pre-Algebra".to_string(),
            unit_name: "Fractions".to_string(),
            topic: "adding unlike denominators".to_string(),
            student_level: StudentLevel::Standard,
            assessment_type: AssessmentType::Quiz,
            time_minutes: 15,
            lesson_name: None,
            additional_details: None,
            focus_areas: vec![],
            misconceptions: vec![],
            avoid_list: vec![],
            source_documents: vec![],
            example_assessment: None,
            question_count: None,
            question_format: None,
            bloom_preference: None,
            section_structure: None,
            standards_alignment: None,
            teacher_id: None,
        }
    }

    #[test]
    fn test_wire_shape_is_camel_case() {
        let json = serde_json::to_value(intent()).unwrap();
        assert_eq!(json["studentLevel"], "standard");
        assert_eq!(json["assessmentType"], "quiz");
        assert_eq!(json["timeMinutes"], 15);
        assert!(json.get("lessonName").is_none());
    }

    #[test]
    fn test_min_grade_handles_kindergarten() {
        let mut i = intent();
        i.grade_levels = vec!["K".to_string(), "2".to_string()];
        assert_eq!(i.min_grade(), Some(0));
        i.grade_levels = vec!["10".to_string(), "11".to_string()];
        assert_eq!(i.min_grade(), Some(10));
    }

    #[test]
    fn test_merge_defaults_does_not_override() {
        let mut i = intent();
        i.bloom_preference = Some(BloomPreference::HigherOrder);
        let defaults = TeacherDefaults {
            question_format: Some(QuestionFormat::Mixed),
            bloom_preference: Some(BloomPreference::Recall),
            section_structure: None,
            standards_alignment: None,
        };
        i.merge_defaults(&defaults);
        assert_eq!(i.question_format, Some(QuestionFormat::Mixed));
        assert_eq!(i.bloom_preference, Some(BloomPreference::HigherOrder));
    }

    #[test]
    fn test_tier_gate() {
        assert!(!SubscriptionTier::Free.allows_playtest());
        assert!(!SubscriptionTier::Tier1.allows_playtest());
        assert!(SubscriptionTier::Tier2.allows_playtest());
        assert!(SubscriptionTier::Admin.allows_playtest());
    }
}

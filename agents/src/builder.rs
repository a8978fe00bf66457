//! Builder Agent
//!
//! Final assembly: display numbering in blueprint slot order, the answer
//! key, per-item metadata, and the achieved cognitive distribution.

use std::collections::BTreeMap;
use tracing::debug;

use examsmith_core::blueprint::BlueprintPlan;
use examsmith_core::item::{
    AssessmentItem, AssessmentMetadata, FinalAssessment, GeneratedItem, ItemMetadata,
};

/// Assemble the final assessment from the accepted items. Items are expected
/// in blueprint slot order; slots without an item are skipped and numbering
/// stays dense.
pub fn build_assessment(
    blueprint: &BlueprintPlan,
    items: &[GeneratedItem],
    forced_complete: bool,
) -> FinalAssessment {
    let intent = &blueprint.uar;
    let mut assembled = Vec::with_capacity(items.len());
    let mut distribution: BTreeMap<_, usize> = BTreeMap::new();

    let mut number = 0usize;
    for item in items {
        let Some(slot) = blueprint.slot(&item.slot_id) else {
            continue;
        };
        number += 1;
        *distribution.entry(slot.cognitive_demand).or_insert(0) += 1;
        assembled.push(AssessmentItem {
            item_number: number,
            prompt: item.prompt.clone(),
            options: item.options.clone().filter(|o| !o.is_empty()),
            answer_key: item.answer.clone(),
            metadata: ItemMetadata {
                slot_id: slot.id.clone(),
                question_type: slot.question_type,
                cognitive_demand: slot.cognitive_demand,
                difficulty: slot.difficulty,
            },
        });
    }

    let title = format!(
        "{} {}: {}",
        intent.course, intent.assessment_type, intent.topic
    );
    debug!("built \"{}\" with {} item(s)", title, assembled.len());

    FinalAssessment {
        title,
        total_items: assembled.len(),
        items: assembled,
        cognitive_distribution: distribution,
        metadata: AssessmentMetadata {
            course: intent.course.clone(),
            unit_name: intent.unit_name.clone(),
            topic: intent.topic.clone(),
            assessment_type: intent.assessment_type.to_string(),
            time_minutes: intent.time_minutes,
            forced_complete,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use examsmith_core::bloom::BloomLevel;
    use examsmith_core::blueprint::{
        Difficulty, FormattingRules, OrderingStrategy, PacingBand, QuestionType, ScopeWidth, Slot,
    };

    fn fixture() -> (BlueprintPlan, Vec<GeneratedItem>) {
        let intent = serde_json::from_value(serde_json::json!({
            "gradeLevels": ["7"],
            "course": "Pre-Algebra",
            "unitName": "Fractions",
            "topic": "adding unlike denominators",
            "studentLevel": "standard",
            "assessmentType": "quiz",
            "timeMinutes": 15
        }))
        .unwrap();
        let demands = [BloomLevel::Remember, BloomLevel::Apply, BloomLevel::Apply];
        let slots: Vec<Slot> = demands
            .iter()
            .enumerate()
            .map(|(i, demand)| Slot {
                id: format!("slot-{:02}", i + 1),
                question_type: QuestionType::ShortAnswer,
                cognitive_demand: *demand,
                difficulty: Difficulty::Medium,
                pacing: PacingBand::Normal,
                requires_image: false,
                operation: None,
            })
            .collect();
        let items: Vec<GeneratedItem> = slots
            .iter()
            .map(|slot| GeneratedItem {
                slot_id: slot.id.clone(),
                question_type: slot.question_type,
                prompt: format!("Question for {}", slot.id),
                options: None,
                answer: "7/12".to_string(),
                explanation: None,
                bloom: None,
            })
            .collect();
        let blueprint = BlueprintPlan {
            slots,
            scope_width: ScopeWidth::Focused,
            depth_floor: BloomLevel::Remember,
            depth_ceiling: BloomLevel::Analyze,
            pacing_seconds_per_item: 90,
            ordering_strategy: OrderingStrategy::EasyToHard,
            constraints: FormattingRules::default(),
            uar: intent,
        };
        (blueprint, items)
    }

    #[test]
    fn test_numbering_is_dense_and_ordered() {
        let (blueprint, items) = fixture();
        let assessment = build_assessment(&blueprint, &items, false);
        assert_eq!(assessment.total_items, 3);
        let numbers: Vec<usize> = assessment.items.iter().map(|i| i.item_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(assessment.items[0].metadata.slot_id, "slot-01");
    }

    #[test]
    fn test_missing_slot_keeps_numbering_dense() {
        let (blueprint, mut items) = fixture();
        items.remove(1);
        let assessment = build_assessment(&blueprint, &items, false);
        assert_eq!(assessment.total_items, 2);
        let numbers: Vec<usize> = assessment.items.iter().map(|i| i.item_number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(assessment.items[1].metadata.slot_id, "slot-03");
    }

    #[test]
    fn test_cognitive_distribution_counts_slot_demands() {
        let (blueprint, items) = fixture();
        let assessment = build_assessment(&blueprint, &items, false);
        assert_eq!(assessment.cognitive_distribution[&BloomLevel::Remember], 1);
        assert_eq!(assessment.cognitive_distribution[&BloomLevel::Apply], 2);
    }

    #[test]
    fn test_forced_complete_flag_carried() {
        let (blueprint, items) = fixture();
        let assessment = build_assessment(&blueprint, &items, true);
        assert!(assessment.metadata.forced_complete);
        assert_eq!(assessment.metadata.assessment_type, "quiz");
    }
}

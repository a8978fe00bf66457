//! Arithmetic Fluency Pre-generation
//!
//! Slots typed arithmetic fluency are filled locally with grade-scaled
//! integer drills and never sent to the LLM.

use rand::Rng;

use examsmith_core::blueprint::{ArithmeticOperation, Slot};
use examsmith_core::item::GeneratedItem;

/// Inclusive operand ceiling for a grade band.
fn operand_ceiling(min_grade: u32) -> i64 {
    match min_grade {
        0..=2 => 10,
        3..=5 => 12,
        _ => 20,
    }
}

/// Generate one fluency item for a slot. Division problems are constructed
/// from a product so the quotient is always a whole number.
pub fn generate_fluency_item(slot: &Slot, min_grade: u32) -> GeneratedItem {
    let mut rng = rand::thread_rng();
    let ceiling = operand_ceiling(min_grade);
    let operation = slot
        .operation
        .unwrap_or(ArithmeticOperation::Addition);

    let (prompt, answer) = match operation {
        ArithmeticOperation::Addition => {
            let a = rng.gen_range(1..=ceiling);
            let b = rng.gen_range(1..=ceiling);
            (format!("Compute: {} + {}", a, b), (a + b).to_string())
        }
        ArithmeticOperation::Subtraction => {
            let a = rng.gen_range(1..=ceiling);
            let b = rng.gen_range(1..=a);
            (format!("Compute: {} - {}", a, b), (a - b).to_string())
        }
        ArithmeticOperation::Multiplication => {
            let a = rng.gen_range(2..=ceiling);
            let b = rng.gen_range(2..=ceiling);
            (format!("Compute: {} x {}", a, b), (a * b).to_string())
        }
        ArithmeticOperation::Division => {
            let divisor = rng.gen_range(2..=ceiling);
            let quotient = rng.gen_range(2..=ceiling);
            (
                format!("Compute: {} / {}", divisor * quotient, divisor),
                quotient.to_string(),
            )
        }
    };

    GeneratedItem {
        slot_id: slot.id.clone(),
        question_type: slot.question_type,
        prompt,
        options: None,
        answer,
        explanation: None,
        bloom: Some(slot.cognitive_demand),
    }
}

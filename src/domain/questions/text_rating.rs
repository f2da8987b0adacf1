//! Compound questions collecting a list of text-plus-rating entries.
//!
//! The strategy walks each entry through three steps (free text, rating
//! buttons, next-or-finish) and keeps its position in the draft's data map
//! under reserved `_`-prefixed keys, so the engine's question index never
//! moves until the participant finishes the whole list.

use crate::domain::survey::{Question, SchemaError};
use crate::ports::{InlineButton, InlineKeyboard};

use super::{
    AnswerContext, AnswerInput, AnswerResult, PromptSpec, QuestionStrategy, RenderContext,
    StrategyError, TYPE_TEXT_RATING,
};

const STEP_COLLECT_TEXT: &str = "text";
const STEP_COLLECT_RATING: &str = "rating";
const STEP_NEXT_OR_FINISH: &str = "next_finish";

const ACTION_NEXT: &str = "next";
const ACTION_FINISH: &str = "finish";

const DEFAULT_RATING_MIN: u8 = 1;
const DEFAULT_RATING_MAX: u8 = 10;
const RATING_CEILING: u8 = 20;

/// Buttons per keyboard row in the rating step.
const RATING_ROW_WIDTH: usize = 5;

/// Strategy for `type: text_rating` questions.
pub struct TextRatingStrategy;

impl TextRatingStrategy {
    fn step_key(question_id: &str) -> String {
        format!("_step_{question_id}")
    }

    fn temp_text_key(question_id: &str) -> String {
        format!("_text_{question_id}")
    }

    fn temp_rating_key(question_id: &str) -> String {
        format!("_rating_{question_id}")
    }

    fn rating_bounds(question: &Question) -> (u8, u8) {
        (
            question.rating_min.unwrap_or(DEFAULT_RATING_MIN),
            question.rating_max.unwrap_or(DEFAULT_RATING_MAX),
        )
    }

    fn format_entry(text: &str, rating: &str) -> String {
        format!("- {text}\n  Rating: {rating}")
    }

    fn render_rating_buttons(&self, ctx: &RenderContext<'_>) -> PromptSpec {
        let (min, max) = Self::rating_bounds(ctx.question);
        let mut keyboard = InlineKeyboard::new();
        let mut row = Vec::new();
        for value in min..=max {
            let data = format!("{}{}:{}", ctx.callback_prefix, ctx.question.id, value);
            row.push(InlineButton::new(value.to_string(), data));
            if row.len() == RATING_ROW_WIDTH {
                keyboard.push_row(std::mem::take(&mut row));
            }
        }
        if !row.is_empty() {
            keyboard.push_row(row);
        }

        PromptSpec {
            text: format!("Rate from {min} to {max}:"),
            keyboard: Some(keyboard),
            force_new: false,
        }
    }

    fn render_next_finish_buttons(&self, ctx: &RenderContext<'_>) -> PromptSpec {
        let next_label = ctx
            .question
            .next_button_label
            .as_deref()
            .unwrap_or("➡️ Next");
        let finish_label = ctx
            .question
            .finish_button_label
            .as_deref()
            .unwrap_or("✅ Finish");

        let next_data = format!("{}{}:{ACTION_NEXT}", ctx.callback_prefix, ctx.question.id);
        let finish_data = format!("{}{}:{ACTION_FINISH}", ctx.callback_prefix, ctx.question.id);
        let keyboard = InlineKeyboard::new().with_row(vec![
            InlineButton::new(next_label, next_data),
            InlineButton::new(finish_label, finish_data),
        ]);

        PromptSpec {
            text: "Choose an action:".to_string(),
            keyboard: Some(keyboard),
            force_new: false,
        }
    }

    fn handle_text_step(
        &self,
        ctx: &mut AnswerContext<'_>,
        input: AnswerInput<'_>,
        step_key: &str,
    ) -> AnswerResult {
        let AnswerInput::Text(body) = input else {
            return AnswerResult::repeat_with("Please send a text reply.");
        };
        let text = body.trim();
        if text.is_empty() {
            return AnswerResult::repeat_with("Please send a text reply.");
        }

        let text_key = Self::temp_text_key(&ctx.question.id);
        ctx.record.data.insert(text_key, text.to_string());
        ctx.record
            .data
            .insert(step_key.to_string(), STEP_COLLECT_RATING.to_string());

        // Re-render to show the rating buttons.
        AnswerResult::repeat()
    }

    fn handle_rating_step(
        &self,
        ctx: &mut AnswerContext<'_>,
        input: AnswerInput<'_>,
        step_key: &str,
    ) -> AnswerResult {
        let AnswerInput::Callback(payload) = input else {
            return AnswerResult::repeat_with("Please use the buttons to pick a rating.");
        };

        let (min, max) = Self::rating_bounds(ctx.question);
        let valid = payload
            .parse::<u8>()
            .is_ok_and(|value| value >= min && value <= max);
        if !valid {
            return AnswerResult::repeat_with(format!(
                "Please pick a rating between {min} and {max}."
            ));
        }

        let rating_key = Self::temp_rating_key(&ctx.question.id);
        ctx.record.data.insert(rating_key, payload.to_string());
        ctx.record
            .data
            .insert(step_key.to_string(), STEP_NEXT_OR_FINISH.to_string());

        AnswerResult::repeat()
    }

    fn handle_next_finish_step(
        &self,
        ctx: &mut AnswerContext<'_>,
        input: AnswerInput<'_>,
        step_key: &str,
    ) -> AnswerResult {
        let AnswerInput::Callback(action) = input else {
            return AnswerResult::repeat_with("Please use the buttons to choose an action.");
        };
        if action != ACTION_NEXT && action != ACTION_FINISH {
            return AnswerResult::repeat_with("Please choose 'Next' or 'Finish'.");
        }

        let text_key = Self::temp_text_key(&ctx.question.id);
        let rating_key = Self::temp_rating_key(&ctx.question.id);
        let text = ctx.record.data.get(&text_key).cloned().unwrap_or_default();
        let rating = ctx.record.data.get(&rating_key).cloned().unwrap_or_default();
        if text.is_empty() || rating.is_empty() {
            return AnswerResult::repeat_with("Could not read your last entry, please try again.");
        }

        let entry = Self::format_entry(&text, &rating);
        let store_key = ctx.question.store_key.clone();
        match ctx.record.data.get_mut(&store_key) {
            Some(existing) if !existing.is_empty() => {
                existing.push('\n');
                existing.push_str(&entry);
            }
            _ => {
                ctx.record.data.insert(store_key, entry);
            }
        }

        ctx.record.data.remove(step_key);
        ctx.record.data.remove(&text_key);
        ctx.record.data.remove(&rating_key);

        if action == ACTION_NEXT {
            // Back to step one for the following entry.
            ctx.record
                .data
                .insert(step_key.to_string(), STEP_COLLECT_TEXT.to_string());
            return AnswerResult::repeat();
        }

        AnswerResult::advance()
    }
}

impl QuestionStrategy for TextRatingStrategy {
    fn name(&self) -> &'static str {
        TYPE_TEXT_RATING
    }

    fn validate(&self, section_id: &str, question: &Question) -> Result<(), SchemaError> {
        if !question.options.is_empty() {
            return Err(SchemaError::question(
                section_id,
                &question.id,
                "type 'text_rating' must not define options",
            ));
        }
        let (min, max) = Self::rating_bounds(question);
        if min < 1 || min > max || max > RATING_CEILING {
            return Err(SchemaError::question(
                section_id,
                &question.id,
                format!(
                    "rating range [{min}, {max}] must satisfy 1 <= min <= max <= {RATING_CEILING}"
                ),
            ));
        }
        Ok(())
    }

    fn render(&self, ctx: &RenderContext<'_>) -> Result<PromptSpec, StrategyError> {
        let step_key = Self::step_key(&ctx.question.id);
        let step = ctx
            .record
            .data
            .get(&step_key)
            .map(String::as_str)
            .unwrap_or(STEP_COLLECT_TEXT);

        match step {
            STEP_COLLECT_TEXT => Ok(PromptSpec {
                text: ctx.question.prompt.clone(),
                keyboard: None,
                force_new: false,
            }),
            STEP_COLLECT_RATING => Ok(self.render_rating_buttons(ctx)),
            STEP_NEXT_OR_FINISH => Ok(self.render_next_finish_buttons(ctx)),
            other => Err(StrategyError::UnknownStep {
                question: ctx.question.id.clone(),
                step: other.to_string(),
            }),
        }
    }

    fn handle_answer(
        &self,
        ctx: &mut AnswerContext<'_>,
        input: AnswerInput<'_>,
    ) -> Result<AnswerResult, StrategyError> {
        let step_key = Self::step_key(&ctx.question.id);
        let step = ctx
            .record
            .data
            .get(&step_key)
            .cloned()
            .unwrap_or_else(|| STEP_COLLECT_TEXT.to_string());

        match step.as_str() {
            STEP_COLLECT_TEXT => Ok(self.handle_text_step(ctx, input, &step_key)),
            STEP_COLLECT_RATING => Ok(self.handle_rating_step(ctx, input, &step_key)),
            STEP_NEXT_OR_FINISH => Ok(self.handle_next_finish_step(ctx, input, &step_key)),
            other => Err(StrategyError::UnknownStep {
                question: ctx.question.id.clone(),
                step: other.to_string(),
            }),
        }
    }
}

//! Button-choice questions: one inline row per option.

use crate::domain::survey::{Question, SchemaError};
use crate::ports::{InlineButton, InlineKeyboard};

use super::{
    AnswerContext, AnswerInput, AnswerResult, PromptSpec, QuestionStrategy, RenderContext,
    StrategyError, TYPE_BUTTONS,
};

/// Strategy for `type: buttons` questions.
pub struct ButtonsStrategy;

impl QuestionStrategy for ButtonsStrategy {
    fn name(&self) -> &'static str {
        TYPE_BUTTONS
    }

    fn validate(&self, section_id: &str, question: &Question) -> Result<(), SchemaError> {
        if question.options.is_empty() {
            return Err(SchemaError::question(
                section_id,
                &question.id,
                "type 'buttons' requires a non-empty option list",
            ));
        }
        for (index, option) in question.options.iter().enumerate() {
            if option.text.is_empty() {
                return Err(SchemaError::question(
                    section_id,
                    &question.id,
                    format!("option #{} has no text", index + 1),
                ));
            }
            if option.value.is_empty() {
                return Err(SchemaError::question(
                    section_id,
                    &question.id,
                    format!("option #{} has no value", index + 1),
                ));
            }
        }
        Ok(())
    }

    fn render(&self, ctx: &RenderContext<'_>) -> Result<PromptSpec, StrategyError> {
        let mut keyboard = InlineKeyboard::new();
        for option in &ctx.question.options {
            let data = format!("{}{}:{}", ctx.callback_prefix, ctx.question.id, option.value);
            keyboard.push_row(vec![InlineButton::new(&option.text, data)]);
        }
        Ok(PromptSpec {
            text: ctx.question.prompt.clone(),
            keyboard: Some(keyboard),
            force_new: false,
        })
    }

    fn handle_answer(
        &self,
        ctx: &mut AnswerContext<'_>,
        input: AnswerInput<'_>,
    ) -> Result<AnswerResult, StrategyError> {
        let AnswerInput::Callback(payload) = input else {
            return Ok(AnswerResult::repeat_with(
                "Please choose using the buttons below.",
            ));
        };

        let Some(option) = ctx.question.option_by_value(payload) else {
            return Ok(AnswerResult::repeat_with(
                "That choice is no longer available. Please try again.",
            ));
        };

        ctx.record
            .data
            .insert(ctx.question.store_key.clone(), option.value.clone());
        Ok(AnswerResult::advance())
    }
}

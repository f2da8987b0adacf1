//! Free-text questions: plain prompt, trimmed text answer.

use crate::domain::survey::{Question, SchemaError};

use super::{
    AnswerContext, AnswerInput, AnswerResult, PromptSpec, QuestionStrategy, RenderContext,
    StrategyError, TYPE_TEXT,
};

/// Strategy for `type: text` questions.
pub struct TextStrategy;

impl QuestionStrategy for TextStrategy {
    fn name(&self) -> &'static str {
        TYPE_TEXT
    }

    fn validate(&self, section_id: &str, question: &Question) -> Result<(), SchemaError> {
        if !question.options.is_empty() {
            return Err(SchemaError::question(
                section_id,
                &question.id,
                "type 'text' must not define options",
            ));
        }
        Ok(())
    }

    fn render(&self, ctx: &RenderContext<'_>) -> Result<PromptSpec, StrategyError> {
        Ok(PromptSpec {
            text: ctx.question.prompt.clone(),
            keyboard: None,
            force_new: false,
        })
    }

    fn handle_answer(
        &self,
        ctx: &mut AnswerContext<'_>,
        input: AnswerInput<'_>,
    ) -> Result<AnswerResult, StrategyError> {
        let AnswerInput::Text(body) = input else {
            return Ok(AnswerResult::repeat_with("Please send a text reply."));
        };

        let value = body.trim();
        if value.is_empty() {
            return Ok(AnswerResult::repeat_with(
                "The text must not be empty, please try again.",
            ));
        }

        ctx.record
            .data
            .insert(ctx.question.store_key.clone(), value.to_string());
        Ok(AnswerResult::advance())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing;
    use super::*;
    use crate::domain::survey::{ButtonOption, Record};
    use crate::ports::ChatMessage;

    #[test]
    fn validate_rejects_options() {
        let mut question = testing::question(TYPE_TEXT, "name");
        question.options.push(ButtonOption {
            text: "A".into(),
            value: "a".into(),
        });
        assert!(TextStrategy.validate("sec", &question).is_err());

        question.options.clear();
        assert!(TextStrategy.validate("sec", &question).is_ok());
    }

    #[test]
    fn render_uses_the_prompt_verbatim_with_no_keyboard() {
        let question = testing::question(TYPE_TEXT, "name");
        let section = testing::section(&question);
        let record = Record::new();
        let last = ChatMessage::default();

        let spec = TextStrategy
            .render(&testing::render_ctx(&record, &section, &question, &last))
            .unwrap();

        assert_eq!(spec.text, "Prompt?");
        assert!(spec.keyboard.is_none());
        assert!(!spec.force_new);
    }

    #[test]
    fn stores_trimmed_text_and_advances() {
        let question = testing::question(TYPE_TEXT, "name");
        let section = testing::section(&question);
        let mut record = Record::new();
        let last = ChatMessage::default();

        let result = TextStrategy
            .handle_answer(
                &mut testing::answer_ctx(&mut record, &section, &question, &last),
                AnswerInput::Text("  Alice  "),
            )
            .unwrap();

        assert!(result.advance);
        assert!(!result.repeat);
        assert_eq!(record.data.get("name").map(String::as_str), Some("Alice"));
    }

    #[test]
    fn empty_text_repeats_with_feedback() {
        let question = testing::question(TYPE_TEXT, "name");
        let section = testing::section(&question);
        let mut record = Record::new();
        let last = ChatMessage::default();

        let result = TextStrategy
            .handle_answer(
                &mut testing::answer_ctx(&mut record, &section, &question, &last),
                AnswerInput::Text("   "),
            )
            .unwrap();

        assert!(result.repeat);
        assert!(!result.advance);
        assert!(result.feedback.is_some());
        assert!(record.data.is_empty());
    }

    #[test]
    fn callback_input_is_rejected_with_feedback() {
        let question = testing::question(TYPE_TEXT, "name");
        let section = testing::section(&question);
        let mut record = Record::new();
        let last = ChatMessage::default();

        let result = TextStrategy
            .handle_answer(
                &mut testing::answer_ctx(&mut record, &section, &question, &last),
                AnswerInput::Callback("whatever"),
            )
            .unwrap();

        assert!(result.repeat);
        assert_eq!(result.feedback.as_deref(), Some("Please send a text reply."));
        assert!(record.data.is_empty());
    }
}

//! Prompt templates for grounded answer generation

use crate::config::AssistantConfig;

/// Prompt builder for RAG queries
pub struct PromptBuilder;

impl PromptBuilder {
    /// System-role instruction binding the model to the supplied context
    pub fn system_instruction(assistant: &AssistantConfig) -> String {
        format!(
            r#"You are a helpful assistant for {org}. Your role is to provide accurate, helpful and friendly answers about {org}'s services, features and policies.

Instructions:
1. Use ONLY the provided context from {org}'s website to answer questions
2. Never make up information that is not in the context
3. If the context does not contain enough information, say so plainly and suggest that the user {support}
4. Provide specific details when available (fees, features, requirements)
5. Be conversational and friendly in tone
6. End with a helpful next step when appropriate"#,
            org = assistant.organization,
            support = assistant.support_hint,
        )
    }

    /// User turn carrying the context and the question
    pub fn user_turn(assistant: &AssistantConfig, context: &str, question: &str) -> String {
        format!(
            r#"Context from {org}'s website:
{context}

User Question: {question}

Please provide a helpful answer based on the context above. Be specific and actionable where possible."#,
            org = assistant.organization,
            context = context,
            question = question,
        )
    }

    /// Fixed reply when nothing relevant was retrieved
    pub fn no_context_message(assistant: &AssistantConfig) -> String {
        format!(
            "I couldn't find relevant information about your question in {}'s knowledge base. \
             The question may be outside what the site covers. Please try rephrasing your \
             question, or {} for assistance.",
            assistant.organization, assistant.support_hint
        )
    }

    /// Fixed reply when the language model could not be reached
    pub fn generation_apology(assistant: &AssistantConfig) -> String {
        format!(
            "I apologize, but I'm experiencing technical difficulties. Please try again or {} for assistance.",
            assistant.support_hint
        )
    }

    /// Fixed reply when every attempt failed with an error
    pub fn technical_error_message(assistant: &AssistantConfig) -> String {
        format!(
            "I apologize for the technical error. Please try again or {}.",
            assistant.support_hint
        )
    }
}

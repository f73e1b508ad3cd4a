//! Directive search: regulatory passages for a question.

use serde_json::json;

use crate::agent::capability::{
    Capability, CapabilityArgs, CapabilityContract, CapabilityOutput, ParamSchema, ParamType,
    SideEffect,
};
use crate::agent::context::AuditContext;
use crate::agent::error::{AgentError, AgentResult};

const DEFAULT_TOP_K: i64 = 3;
const MAX_TOP_K: i64 = 10;

/// Search the directive knowledge base.
pub struct SearchDirectives;

impl Capability for SearchDirectives {
    fn contract(&self) -> CapabilityContract {
        CapabilityContract {
            name: "search_directives".into(),
            description: "Search the regulatory directive knowledge base for requirements, \
                          procedures or technical specifications. Returns ranked passages with \
                          their sources."
                .into(),
            side_effect: SideEffect::Read,
            parameters: vec![
                ParamSchema::required(
                    "query",
                    ParamType::String,
                    "Question about directive requirements.",
                ),
                ParamSchema::optional(
                    "top_k",
                    ParamType::Integer,
                    "Maximum passages to return (1-10, default 3).",
                ),
            ],
        }
    }

    fn execute(&self, ctx: &AuditContext, args: CapabilityArgs) -> AgentResult<CapabilityOutput> {
        let query = args.require_str("query")?;
        let top_k = args.get_integer("top_k").unwrap_or(DEFAULT_TOP_K);
        if !(1..=MAX_TOP_K).contains(&top_k) {
            return Err(AgentError::InvalidArguments {
                capability: "search_directives".into(),
                message: format!("top_k must be between 1 and {MAX_TOP_K}, got {top_k}"),
            });
        }

        let passages = ctx.retrieval.query(query, top_k as usize)?;
        let text = if passages.is_empty() {
            format!("No directive passages matched \"{query}\".")
        } else {
            let mut text = String::from("Directive Guidance:\n");
            for (i, p) in passages.iter().enumerate() {
                text.push_str(&format!(
                    "\n{}. {}\n   Source: {} (relevance {:.2})\n",
                    i + 1,
                    p.text,
                    p.source,
                    p.score
                ));
            }
            text
        };

        Ok(CapabilityOutput::with_data(
            text,
            json!({ "query": query, "passages": passages }),
        ))
    }
}

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::Value;
use taglens_core::{ChatMessage, Task, TaskResult};
use tracing::{debug, info};

use crate::{CodeServerClient, ConfigStore, LlmClient, ResultStore};

/// Upper bound on LLM calls per task.
pub const MAX_TURNS: usize = 5;

pub const SYSTEM_SUFFIX: &str = "\n请使用工具调用获取代码信息并分析问题。";

pub const EXHAUSTED_VERDICT: &str = "对话轮数耗尽仍没有问答，建议重点审视。";

/// Tool-call protocol appended to the first user message. The `\n` and `\"`
/// sequences are literal; models handle them fine and the reply contract
/// keys off the tag tokens, not the surrounding prose.
const TOOL_GUIDE: &str = r#"\n\n【代码分析功能说明】\n你可以使用get_symbol功能获取符号定义信息，可以使用find_refs获取函数引用信息以便于向上追踪函数调用栈。\n\n【强制输出结果要求】\n必须在回答中tag字段，值为[tsj_have][tsj_nothave][tsj_next]:\n- 如判断有代码问题: [tsj_have] 并提供 {\"problem_type\": \"问题类型\", \"context\": \"代码上下文\"}\n- 如判断无代码问题: [tsj_nothave]\n- 如果不能判断，需要获取信息进一步分析，请包含[tsj_next]，并包含get_symbol或者find_refs请求获取更多代码信息,详细格式如下：\n1. 如果需要知道某个函数，宏或者变量的定义，使用get_symbol获取符号信息: {\"command\": \"get_symbol\", \"sym_name\": \"符号名称\"}\n2. 如果需要进一步分析数据流，使用find_refs获取调用信息: {\"command\": \"find_refs\", \"sym_name\": \"符号名称\"}\n\n【输出要求】\n【JSON格式返回要求】\n请以JSON格式返回你的回答，例如：\n{\"tag\": \"tsj_have\", \"problem_info\": {\"problem_type\": \"问题类型\", \"context\": \"代码上下文\"}, \"response\": \"你的分析和解释\"}\n或\n{\"tag\": \"tsj_nothave\", \"response\": \"你的分析和解释\"}\n或\n{\"tag\": \"tsj_next\", \"requests\": [{\"command\": \"get_symbol\", \"sym_name\": \"符号名称\"}], \"response\": \"你的分析和解释\"}\n或\n{\"tag\": \"tsj_next\", \"requests\": [{\"command\": \"find_refs\", \"sym_name\": \"符号名称\"}], \"response\": \"你的分析和解释\"}\n或\n{\"tag\": \"tsj_next\", \"requests\": [{\"command\": \"get_symbol\", \"sym_name\": \"符号名称\"},{\"command\": \"find_refs\", \"sym_name\": \"符号名称\"},{\"command\": \"find_refs\", \"sym_name\": \"符号名称\"}], \"response\": \"你的分析和解释\"}"#;

/// One model reply, dispatched on its `tag`. Anything that does not parse
/// into one of the three shapes is treated as a skipped turn.
#[derive(Debug, Deserialize)]
#[serde(tag = "tag")]
pub enum TaggedReply {
    #[serde(rename = "tsj_have")]
    Have {
        #[serde(default)]
        problem_info: Value,
        #[serde(default)]
        response: Option<String>,
    },
    #[serde(rename = "tsj_nothave")]
    Nothave {
        #[serde(default)]
        problem_info: Value,
        #[serde(default)]
        response: Option<String>,
    },
    #[serde(rename = "tsj_next")]
    Next {
        #[serde(default)]
        requests: Vec<Value>,
        #[serde(default)]
        response: Option<String>,
    },
}

pub fn parse_reply(content: &str) -> Option<TaggedReply> {
    serde_json::from_str(content).ok()
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
pub struct ToolRequest {
    pub command: String,
    pub sym_name: String,
}

/// Individually malformed request entries are dropped; the rest still run.
pub fn tool_requests(raw: &[Value]) -> Vec<ToolRequest> {
    raw.iter()
        .filter_map(|value| serde_json::from_value(value.clone()).ok())
        .collect()
}

struct Verdict {
    has_problem_info: bool,
    problem_info: Value,
    response: Option<String>,
}

/// Drives the bounded conversation for one task: model reply, optional tool
/// dispatch against the code server, repeat. Terminal tags and turn
/// exhaustion both persist a result; config misses and transport failures
/// abort without one.
pub struct DialogueEngine {
    config: Arc<ConfigStore>,
    results: Arc<ResultStore>,
}

impl DialogueEngine {
    pub fn new(config: Arc<ConfigStore>, results: Arc<ResultStore>) -> Self {
        Self { config, results }
    }

    pub async fn run(&self, task: &Task) -> Result<()> {
        let profile = self
            .config
            .llm_profile(&task.llm_config_name)
            .ok_or_else(|| anyhow!("no LLM profile named {:?}", task.llm_config_name))?;
        let server_url = self
            .config
            .code_server_url(&task.code_server_name)
            .ok_or_else(|| anyhow!("no code server named {:?}", task.code_server_name))?;

        let llm = LlmClient::new(profile)?;
        let code_server = CodeServerClient::new(&server_url)?;

        let result = self.converse(&llm, &code_server, task).await?;
        info!(
            task_id = %task.id,
            has_problem_info = result.has_problem_info,
            "task finished"
        );
        self.results.append(&task.id, &result)?;
        Ok(())
    }

    async fn converse(
        &self,
        llm: &LlmClient,
        code_server: &CodeServerClient,
        task: &Task,
    ) -> Result<TaskResult> {
        let mut transcript = vec![
            ChatMessage::system(format!("{}{SYSTEM_SUFFIX}", task.system_prompt)),
            ChatMessage::user(format!("{}{TOOL_GUIDE}", task.user_prompt)),
        ];

        let mut verdict: Option<Verdict> = None;
        for turn in 0..MAX_TURNS {
            let content = llm.chat(&transcript).await?;
            transcript.push(ChatMessage::assistant(content.clone()));

            match parse_reply(&content) {
                Some(TaggedReply::Have {
                    problem_info,
                    response,
                }) => {
                    verdict = Some(Verdict {
                        has_problem_info: true,
                        problem_info,
                        response,
                    });
                    break;
                }
                Some(TaggedReply::Nothave {
                    problem_info,
                    response,
                }) => {
                    verdict = Some(Verdict {
                        has_problem_info: false,
                        problem_info,
                        response,
                    });
                    break;
                }
                Some(TaggedReply::Next { requests, .. }) => {
                    for request in tool_requests(&requests) {
                        let body = match request.command.as_str() {
                            "get_symbol" => code_server.get_symbol(&request.sym_name).await?,
                            "find_refs" => code_server.find_refs(&request.sym_name).await?,
                            _ => continue,
                        };
                        transcript.push(ChatMessage::user(body));
                    }
                }
                None => {
                    debug!(task_id = %task.id, turn, "unparseable reply, skipping turn");
                }
            }
        }

        Ok(match verdict {
            Some(v) => TaskResult {
                has_problem_info: v.has_problem_info,
                problem_info: v.problem_info,
                response: v.response,
                conversation: transcript,
            },
            // Running out of turns without a verdict is itself a signal.
            None => TaskResult {
                has_problem_info: true,
                problem_info: Value::String(EXHAUSTED_VERDICT.to_string()),
                response: None,
                conversation: transcript,
            },
        })
    }
}

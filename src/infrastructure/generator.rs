//! 题目生成器 - 基础设施层
//!
//! 只暴露"发送提示词、拿回原始文本"的能力，不认识题目结构，不做校验。
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 兼容 OpenAI API 的服务（通过 base URL 切换）
//! - 单次调用由 `tokio::time::timeout` 限时，超时按瞬时错误处理

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::GeneratorError;

/// 一次生成请求
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt_text: String,
    pub system_prompt: Option<String>,
    pub temperature: f32,
    /// 输出长度上限（token）
    pub max_output_size: u32,
}

/// 外部题目生成器
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    /// 返回生成器的原始输出文本
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GeneratorError>;
}

/// 基于 OpenAI 兼容接口的生成器
pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    model_name: String,
    timeout: Duration,
}

impl OpenAiGenerator {
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    async fn call(&self, request: &GenerationRequest) -> Result<String, GeneratorError> {
        let mut messages = Vec::new();

        if let Some(system) = &request.system_prompt {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(system.as_str())
                .build()
                .map_err(|e| GeneratorError::Misconfigured(e.to_string()))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(request.prompt_text.as_str())
            .build()
            .map_err(|e| GeneratorError::Misconfigured(e.to_string()))?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(request.temperature)
            .max_tokens(request.max_output_size)
            .build()
            .map_err(|e| GeneratorError::Misconfigured(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| {
                warn!("LLM API 调用失败: {}", e);
                classify_api_error(&e.to_string())
            })?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| GeneratorError::Transient("LLM 返回内容为空".to_string()))
    }
}

#[async_trait]
impl QuestionGenerator for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GeneratorError> {
        debug!(
            "调用 LLM API，模型: {}，温度: {}，提示词 {} 字符",
            self.model_name,
            request.temperature,
            request.prompt_text.chars().count()
        );

        match tokio::time::timeout(self.timeout, self.call(request)).await {
            Ok(result) => result,
            Err(_) => Err(GeneratorError::Timeout(self.timeout.as_secs())),
        }
    }
}

/// 根据错误信息区分凭证/模型类问题和可重试问题
pub fn classify_api_error(message: &str) -> GeneratorError {
    let lower = message.to_lowercase();
    let misconfigured = [
        "401",
        "403",
        "invalid_api_key",
        "incorrect api key",
        "unauthorized",
        "model_not_found",
        "does not exist",
        "invalid_request_error",
    ];
    if misconfigured.iter().any(|marker| lower.contains(marker)) {
        GeneratorError::Misconfigured(message.to_string())
    } else {
        GeneratorError::Transient(message.to_string())
    }
}

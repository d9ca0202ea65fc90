use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio_test::{assert_err, assert_ok};

use question_qa::config::{Config, PipelineConfig};
use question_qa::error::{GeneratorError, PipelineError};
use question_qa::infrastructure::{GenerationRequest, GenerationThrottle, QuestionGenerator};
use question_qa::models::{CandidateItem, GenerationMode, IssueCode, OptionLetter, TopicJob};
use question_qa::services::{AcceptedSink, CorpusSource};
use question_qa::workflow::{BatchCtx, GenerationFlow};
use question_qa::App;

const SOURCE: &str = "Artículo 21. Obligación de resolver.\n\
    La Administración está obligada a dictar resolución expresa y a notificarla en todos los procedimientos cualquiera que sea su forma de iniciación.\n\
    El plazo máximo en el que debe notificarse la resolución expresa será el fijado por la norma reguladora del correspondiente procedimiento.\n\
    Cuando las normas reguladoras de los procedimientos no fijen el plazo máximo, éste será de tres meses.\n\
    Ley 39/2015, de 1 de octubre, del Procedimiento Administrativo Común de las Administraciones Públicas.";

const SOURCE_WITHOUT_REFERENCES: &str = "La Administración está obligada a dictar resolución expresa en todos los procedimientos.\n\
    Cuando las normas reguladoras de los procedimientos no fijen el plazo máximo, éste será de tres meses.";

const QUOTE: &str = "Cuando las normas reguladoras de los procedimientos no fijen el plazo máximo, éste será de tres meses";

const STEMS: [&str; 15] = [
    "¿Cuál es el plazo máximo para resolver cuando la norma reguladora no lo fija?",
    "¿Qué obligación impone la ley a la Administración respecto de todos los procedimientos?",
    "¿Quién fija el plazo máximo de notificación de la resolución expresa?",
    "¿Desde qué momento se computa el plazo en los procedimientos iniciados de oficio?",
    "¿Puede una norma con rango de ley establecer un plazo superior a seis meses?",
    "¿Qué efecto tiene el silencio administrativo en procedimientos iniciados a solicitud del interesado?",
    "¿En qué supuestos puede suspenderse el transcurso del plazo máximo legal?",
    "¿Cómo debe publicarse la relación de procedimientos con sus plazos?",
    "¿Qué ocurre si la Administración incumple la obligación de dictar resolución?",
    "¿Está obligada la Administración a resolver en caso de desistimiento?",
    "¿Qué plazo tiene el órgano competente para acordar una ampliación?",
    "¿Qué debe contener la comunicación dirigida a los interesados sobre el plazo?",
    "¿Cabe recurso contra el acuerdo que decide sobre la ampliación de plazos?",
    "¿Qué personal responde del cumplimiento de la obligación legal de resolver?",
    "¿Cuándo se entiende iniciado el cómputo para las solicitudes presentadas electrónicamente?",
];

// ========== 测试替身 ==========

/// 按顺序返回预设结果的生成器，用完后重复最后一个
struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, GeneratorError>>>,
    last: Mutex<Option<Result<String, GeneratorError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    fn new(script: Vec<Result<String, GeneratorError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn always(response: Result<String, GeneratorError>) -> Arc<Self> {
        Self::new(vec![response])
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuestionGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GeneratorError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(response) = next {
            *last = Some(response);
        }
        last.clone()
            .unwrap_or_else(|| Err(GeneratorError::Transient("empty script".to_string())))
    }
}

struct MemoryCorpus {
    questions: Vec<String>,
}

#[async_trait]
impl CorpusSource for MemoryCorpus {
    async fn existing_questions(&self, _topic_id: &str) -> question_qa::Result<Vec<String>> {
        Ok(self.questions.clone())
    }
}

#[derive(Default)]
struct MemorySink {
    saved: Mutex<Vec<(String, Vec<CandidateItem>)>>,
}

#[async_trait]
impl AcceptedSink for MemorySink {
    async fn persist(&self, topic_id: &str, items: &[CandidateItem]) -> question_qa::Result<()> {
        self.saved
            .lock()
            .unwrap()
            .push((topic_id.to_string(), items.to_vec()));
        Ok(())
    }
}

// ========== 测试数据 ==========

fn record(n: usize, stem: &str) -> Value {
    json!({
        "question": stem,
        "options": [
            format!("Respuesta correcta del supuesto {}", n),
            format!("Primer distractor del supuesto {}", n),
            format!("Segundo distractor del supuesto {}", n),
            format!("Tercer distractor del supuesto {}", n),
        ],
        "correct": "A",
        "explanation": format!(
            "Conforme al artículo 21 de la Ley 39/2015, \"{}\". La opción B es incorrecta porque contradice ese plazo y la opción C es incorrecta porque no figura en la norma.",
            QUOTE
        ),
        "difficulty": "medium"
    })
}

fn valid_batch() -> String {
    let records: Vec<Value> = STEMS.iter().enumerate().map(|(n, stem)| record(n, stem)).collect();
    json!({ "questions": records }).to_string()
}

/// 没有任何条款和法规引用的批次
fn uncited_batch() -> String {
    let records: Vec<Value> = STEMS
        .iter()
        .enumerate()
        .map(|(n, stem)| {
            json!({
                "question": stem,
                "options": [format!("a{}", n), format!("b{}", n), format!("c{}", n), format!("d{}", n)],
                "correct": 0,
                "explanation": format!("\"{}\". La opción B y la opción C no son correctas.", QUOTE)
            })
        })
        .collect();
    Value::Array(records).to_string()
}

fn job(topic_id: &str, source: &str) -> TopicJob {
    TopicJob {
        topic_id: topic_id.to_string(),
        title: "Obligación de resolver".to_string(),
        mode: GenerationMode::Theme,
        base_content: source.to_string(),
        instructions: None,
        file_path: None,
    }
}

fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        backoff_base_ms: 1,
        ..PipelineConfig::default()
    }
}

fn flow(generator: Arc<ScriptedGenerator>, config: PipelineConfig) -> GenerationFlow {
    GenerationFlow::new(generator, Arc::new(GenerationThrottle::unlimited()), config)
}

fn ctx() -> BatchCtx {
    BatchCtx::new("t1".to_string(), 1, GenerationMode::Theme)
}

// ========== 流程测试 ==========

#[tokio::test]
async fn test_valid_batch_is_accepted_and_rebalanced() {
    let generator = ScriptedGenerator::always(Ok(valid_batch()));
    let flow = flow(generator.clone(), pipeline_config());

    let output = assert_ok!(flow.run(&job("t1", SOURCE), &[], &ctx()).await);

    assert_eq!(generator.calls(), 1);
    assert_eq!(output.attempts, 1);
    assert_eq!(output.items.len(), 15);
    assert!(output.rebalance.compliant);
    assert!(output.rebalance.changed());

    let letters: Vec<OptionLetter> = output.items.iter().map(|i| i.correct_letter).collect();
    for window in letters.windows(3) {
        assert!(!(window[0] == window[1] && window[1] == window[2]), "{:?}", letters);
    }
    let mut distinct = letters.clone();
    distinct.sort();
    distinct.dedup();
    assert!(distinct.len() >= 3);

    // 顺序不变，正确选项的文本不变
    for (n, item) in output.items.iter().enumerate() {
        assert_eq!(item.prompt_text, STEMS[n]);
        assert_eq!(item.correct_text(), format!("Respuesta correcta del supuesto {}", n));
    }
}

#[tokio::test]
async fn test_first_request_uses_warmest_temperature_and_mandatory_quotes() {
    let generator = ScriptedGenerator::always(Ok(valid_batch()));
    let flow = flow(generator.clone(), pipeline_config());
    assert_ok!(flow.run(&job("t1", SOURCE), &[], &ctx()).await);

    let request = &generator.requests()[0];
    assert_eq!(request.temperature, 0.7);
    assert_eq!(request.max_output_size, 8000);
    assert!(request.prompt_text.contains("Mandatory quotes"));
    assert!(request.prompt_text.contains(QUOTE));
    assert!(request.system_prompt.is_some());
}

#[tokio::test]
async fn test_retry_terminates_after_max_attempts_with_citation_issues() {
    let generator = ScriptedGenerator::always(Ok(uncited_batch()));
    let flow = flow(generator.clone(), pipeline_config());

    let result = flow.run(&job("t1", SOURCE_WITHOUT_REFERENCES), &[], &ctx()).await;
    let err = assert_err!(result);

    assert_eq!(generator.calls(), 3);
    match &err {
        PipelineError::AttemptsExhausted { attempts, issues } => {
            assert_eq!(*attempts, 3);
            for index in 0..15 {
                assert!(
                    issues
                        .iter()
                        .any(|i| i.item_index == Some(index) && i.code.is_citation()),
                    "item {} has no citation issue",
                    index
                );
            }
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(err.count_issues(IssueCode::MissingArticle), 15);
    assert!(err.to_string().starts_with("generation failed after 3 attempts: item 1 [missing_article]"));

    // 温度逐次降低，修正意见逐次累积
    let requests = generator.requests();
    let temperatures: Vec<f32> = requests.iter().map(|r| r.temperature).collect();
    assert_eq!(temperatures, vec![0.7, 0.5, 0.3]);
    assert!(!requests[0].prompt_text.contains("was rejected"));
    assert!(requests[1].prompt_text.contains("Attempt 1 was rejected:"));
    assert!(requests[2].prompt_text.contains("Attempt 1 was rejected:"));
    assert!(requests[2].prompt_text.contains("Attempt 2 was rejected:"));
    assert!(requests[1].prompt_text.contains("more problems of the same kind"));
}

#[tokio::test]
async fn test_uncited_batches_fail_even_when_source_has_references() {
    let generator = ScriptedGenerator::always(Ok(uncited_batch()));
    let flow = flow(generator.clone(), pipeline_config());

    let err = assert_err!(flow.run(&job("t1", SOURCE), &[], &ctx()).await);

    assert_eq!(generator.calls(), 3);
    assert!(matches!(err, PipelineError::AttemptsExhausted { attempts: 3, .. }));
    assert_eq!(err.count_issues(IssueCode::MissingArticle), 15);
    assert_eq!(err.count_issues(IssueCode::MissingInstrument), 15);
    for index in 0..15 {
        assert!(err
            .issues()
            .iter()
            .any(|i| i.item_index == Some(index) && i.code.is_citation()));
    }
}

#[tokio::test]
async fn test_malformed_output_fails_attempts_without_crashing() {
    let generator = ScriptedGenerator::always(Ok("Lo siento, hoy no puedo generar preguntas.".to_string()));
    let flow = flow(generator.clone(), pipeline_config());

    let err = assert_err!(flow.run(&job("t1", SOURCE), &[], &ctx()).await);

    assert_eq!(generator.calls(), 3);
    assert_eq!(err.count_issues(IssueCode::MalformedOutput), 1);
    let retry_prompt = &generator.requests()[1].prompt_text;
    assert!(retry_prompt.contains("[malformed_output]"));
    assert!(retry_prompt.contains("a JSON array of exactly 15 objects"));
}

#[tokio::test]
async fn test_malformed_then_valid_succeeds_on_second_attempt() {
    let generator = ScriptedGenerator::new(vec![Ok("```json\n{\"oops\": true}\n```".to_string()), Ok(valid_batch())]);
    let flow = flow(generator.clone(), pipeline_config());

    let output = assert_ok!(flow.run(&job("t1", SOURCE), &[], &ctx()).await);
    assert_eq!(output.attempts, 2);
    assert_eq!(generator.calls(), 2);
}

#[tokio::test]
async fn test_transient_errors_are_retried_with_backoff() {
    let generator = ScriptedGenerator::new(vec![
        Err(GeneratorError::Timeout(180)),
        Err(GeneratorError::Transient("502 Bad Gateway".to_string())),
        Ok(valid_batch()),
    ]);
    let flow = flow(generator.clone(), pipeline_config());

    let output = assert_ok!(flow.run(&job("t1", SOURCE), &[], &ctx()).await);

    // 瞬时重试不占用生成尝试次数
    assert_eq!(output.attempts, 1);
    assert_eq!(generator.calls(), 3);
}

#[tokio::test]
async fn test_exhausted_transient_retries_fail_the_attempt() {
    let generator = ScriptedGenerator::always(Err(GeneratorError::Transient("connection reset".to_string())));
    let config = PipelineConfig {
        max_attempts: 2,
        transient_retries: 2,
        ..pipeline_config()
    };
    let flow = flow(generator.clone(), config);

    let err = assert_err!(flow.run(&job("t1", SOURCE), &[], &ctx()).await);

    assert_eq!(generator.calls(), 4);
    assert_eq!(err.count_issues(IssueCode::GeneratorUnavailable), 1);
    assert!(!err.is_misconfiguration());
}

#[tokio::test]
async fn test_misconfiguration_fails_immediately() {
    let generator = ScriptedGenerator::always(Err(GeneratorError::Misconfigured("invalid_api_key".to_string())));
    let flow = flow(generator.clone(), pipeline_config());

    let err = assert_err!(flow.run(&job("t1", SOURCE), &[], &ctx()).await);

    assert_eq!(generator.calls(), 1);
    assert!(err.is_misconfiguration());
    assert!(matches!(err, PipelineError::Generator(GeneratorError::Misconfigured(_))));
}

#[tokio::test]
async fn test_duplicate_of_corpus_forces_retry() {
    let mut replaced: Vec<Value> = STEMS.iter().enumerate().map(|(n, stem)| record(n, stem)).collect();
    replaced[0] = record(0, "¿Qué sucede con las peticiones formuladas por medios electrónicos fuera de horario?");

    let generator = ScriptedGenerator::new(vec![Ok(valid_batch()), Ok(Value::Array(replaced).to_string())]);
    let flow = flow(generator.clone(), pipeline_config());
    let corpus = vec![STEMS[0].to_string()];

    let output = assert_ok!(flow.run(&job("t1", SOURCE), &corpus, &ctx()).await);

    assert_eq!(output.attempts, 2);
    assert!(generator.requests()[1].prompt_text.contains("[duplicate]"));
    assert!(output.items.iter().all(|item| item.prompt_text != STEMS[0]));
}

// ========== 编排测试 ==========

fn app_config(name: &str) -> (Config, std::path::PathBuf) {
    let dir = std::env::temp_dir().join(format!("qa_app_{}_{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let config = Config {
        max_concurrent_topics: 2,
        jobs_folder: dir.join("topics").to_string_lossy().to_string(),
        failure_log_file: dir.join("failed.txt").to_string_lossy().to_string(),
        output_log_file: dir.join("output.txt").to_string_lossy().to_string(),
        topic_delay_ms: 0,
        min_request_interval_ms: 0,
        llm_api_key: "test".to_string(),
        pipeline: pipeline_config(),
        ..Config::default()
    };
    (config, dir)
}

#[tokio::test]
async fn test_app_processes_jobs_and_records_failures() {
    let (config, dir) = app_config("jobs");
    let failure_log = config.failure_log_file.clone();

    // 依据材料决定批次内容：有引用的专题成功，没有引用的专题失败
    struct BySourceGenerator;

    #[async_trait]
    impl QuestionGenerator for BySourceGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, GeneratorError> {
            if request.prompt_text.contains("Ley 39/2015, de 1 de octubre") {
                Ok(valid_batch())
            } else {
                Ok(uncited_batch())
            }
        }
    }

    let sink = Arc::new(MemorySink::default());
    let app = App::with_components(
        config,
        Arc::new(BySourceGenerator),
        Arc::new(MemoryCorpus { questions: Vec::new() }),
        sink.clone(),
    );

    let stats = assert_ok!(
        app.process_jobs(vec![job("good", SOURCE), job("bad", SOURCE_WITHOUT_REFERENCES)])
            .await
    );

    assert_eq!(stats.total, 2);
    assert_eq!(stats.success, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.accepted_questions, 15);

    let saved = sink.saved.lock().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].0, "good");
    assert_eq!(saved[0].1.len(), 15);

    let failures = std::fs::read_to_string(&failure_log).unwrap();
    assert!(failures.starts_with("专题 bad | generation failed after 3 attempts"));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_app_stops_after_misconfiguration() {
    let (mut config, dir) = app_config("misconfigured");
    config.max_concurrent_topics = 1;
    let failure_log = config.failure_log_file.clone();

    let generator = ScriptedGenerator::always(Err(GeneratorError::Misconfigured("invalid_api_key".to_string())));
    let sink = Arc::new(MemorySink::default());
    let app = App::with_components(
        config,
        generator.clone(),
        Arc::new(MemoryCorpus { questions: Vec::new() }),
        sink.clone(),
    );

    let result = app
        .process_jobs(vec![job("m1", SOURCE), job("m2", SOURCE), job("m3", SOURCE)])
        .await;

    let err = assert_err!(result);
    assert!(err.to_string().contains("invalid_api_key"));
    // 后续批次不再调用生成器
    assert_eq!(generator.calls(), 1);
    assert!(sink.saved.lock().unwrap().is_empty());

    let failures = std::fs::read_to_string(&failure_log).unwrap();
    assert!(failures.starts_with("专题 m1 |"));
    assert!(!failures.contains("专题 m2"));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_app_run_loads_topic_files() {
    let (config, dir) = app_config("run");
    std::fs::create_dir_all(&config.jobs_folder).unwrap();
    let toml = format!(
        "topic_id = \"ley39\"\ntitle = \"Obligación de resolver\"\nmode = \"theme\"\nbase_content = '''\n{}\n'''\n",
        SOURCE
    );
    std::fs::write(std::path::Path::new(&config.jobs_folder).join("ley39.toml"), toml).unwrap();

    let generator = ScriptedGenerator::always(Ok(valid_batch()));
    let sink = Arc::new(MemorySink::default());
    let app = App::with_components(
        config,
        generator.clone(),
        Arc::new(MemoryCorpus { questions: Vec::new() }),
        sink.clone(),
    );

    let stats = assert_ok!(app.run().await);
    assert_eq!(stats.success, 1);
    assert_eq!(generator.calls(), 1);
    assert_eq!(sink.saved.lock().unwrap()[0].0, "ley39");

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
#[ignore] // 需要真实 API key：cargo test -- --ignored
async fn test_live_generation() {
    question_qa::utils::logging::init();
    let config = Config::load().expect("LLM_API_KEY 未设置");
    let generator = Arc::new(question_qa::OpenAiGenerator::new(&config));
    let flow = GenerationFlow::new(generator, Arc::new(GenerationThrottle::unlimited()), config.pipeline.clone());

    let output = flow.run(&job("live", SOURCE), &[], &ctx()).await;
    if let Err(e) = &output {
        println!("生成失败: {}", e);
    }
}

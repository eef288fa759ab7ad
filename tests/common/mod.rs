// 集成测试公共模块
//
// 提供模拟翻译服务、测试配置和 HTML 辅助工具

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use markup5ever_rcdom::{Handle, RcDom};

use page_translator::parsers::html::dom::{get_classes, get_node_attr, html_to_dom, text_content};
use page_translator::parsers::{serialize_document, SelectorList};
use page_translator::translation::{
    KeyValueStore, MemoryStore, TranslateRequest, TranslatedItem, TranslationClient,
    TranslationConfig, TranslationEngine, TranslationError, TranslationResult,
};

/// 模拟翻译服务的响应方式
#[derive(Debug, Clone)]
pub enum MockMode {
    /// 查表，表中没有的文本返回 `[lang] text`
    Translate,
    /// 返回给定错误
    Fail(TranslationError),
    /// 只翻译前 n 项
    Partial(usize),
}

/// 模拟翻译服务
///
/// 克隆共享同一份状态，测试可以在引擎持有客户端之后继续修改行为和检查请求。
#[derive(Clone)]
pub struct MockClient {
    mode: Rc<RefCell<MockMode>>,
    dictionary: Rc<RefCell<HashMap<(String, String), String>>>,
    requests: Rc<RefCell<Vec<TranslateRequest>>>,
    calls: Rc<Cell<usize>>,
    delay: Option<Duration>,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            mode: Rc::new(RefCell::new(MockMode::Translate)),
            dictionary: Rc::new(RefCell::new(HashMap::new())),
            requests: Rc::new(RefCell::new(Vec::new())),
            calls: Rc::new(Cell::new(0)),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_translation(self, text: &str, language: &str, translated: &str) -> Self {
        self.dictionary
            .borrow_mut()
            .insert((text.to_string(), language.to_string()), translated.to_string());
        self
    }

    pub fn set_mode(&self, mode: MockMode) {
        *self.mode.borrow_mut() = mode;
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn requests(&self) -> Vec<TranslateRequest> {
        self.requests.borrow().clone()
    }

    pub fn last_request(&self) -> Option<TranslateRequest> {
        self.requests.borrow().last().cloned()
    }

    fn lookup(&self, text: &str, language: &str) -> String {
        self.dictionary
            .borrow()
            .get(&(text.to_string(), language.to_string()))
            .cloned()
            .unwrap_or_else(|| format!("[{}] {}", language, text))
    }
}

impl TranslationClient for MockClient {
    async fn translate(&self, request: TranslateRequest) -> TranslationResult<Vec<TranslatedItem>> {
        self.calls.set(self.calls.get() + 1);
        self.requests.borrow_mut().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mode = self.mode.borrow().clone();
        let limit = match mode {
            MockMode::Fail(error) => return Err(error),
            MockMode::Partial(n) => n,
            MockMode::Translate => usize::MAX,
        };

        Ok(request
            .content
            .iter()
            .take(limit)
            .map(|item| TranslatedItem {
                id: item.id.clone(),
                translated: self.lookup(&item.text, &request.target_language),
            })
            .collect())
    }
}

/// 测试配置构建器
pub struct TestConfigBuilder {
    config: TranslationConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: TranslationConfig::new("docs", "test-key"),
        }
    }

    pub fn with_site(mut self, site_id: &str) -> Self {
        self.config.site_id = Some(site_id.to_string());
        self
    }

    pub fn with_target(mut self, language: &str) -> Self {
        self.config.target_language = Some(language.to_string());
        self
    }

    pub fn with_fast_ticks(mut self) -> Self {
        self.config.tick_interval_ms = 10;
        self
    }

    pub fn with_retry(mut self, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.config.retry.base_delay_ms = base_delay_ms;
        self.config.retry.max_delay_ms = max_delay_ms;
        self
    }

    pub fn with_cache_ttl(mut self, secs: u64) -> Self {
        self.config.cache_ttl_secs = Some(secs);
        self
    }

    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs);
        self
    }

    pub fn build(self) -> TranslationConfig {
        self.config
    }
}

/// 测试环境：引擎、共享存储和模拟客户端
pub struct TestEnvironment {
    pub engine: TranslationEngine<MockClient>,
    pub client: MockClient,
    pub store: Arc<dyn KeyValueStore>,
}

impl TestEnvironment {
    pub fn new(config: TranslationConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()), MockClient::new())
    }

    pub fn with_store(config: TranslationConfig, store: Arc<dyn KeyValueStore>, client: MockClient) -> Self {
        let engine = TranslationEngine::new(config, Arc::clone(&store), client.clone())
            .expect("test config should be valid");
        Self {
            engine,
            client,
            store,
        }
    }

    /// 用同一份存储开启一个新会话（模拟页面重新加载）
    pub fn reopen(&self, config: TranslationConfig) -> Self {
        Self::with_store(config, Arc::clone(&self.store), self.client.clone())
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new(TestConfigBuilder::new().build())
    }
}

/// HTML 测试辅助工具
pub struct HtmlTestHelper;

impl HtmlTestHelper {
    pub fn create_test_dom(html: &str) -> RcDom {
        html_to_dom(html.as_bytes(), "utf-8")
    }

    pub fn create_greeting_page() -> String {
        r#"<!DOCTYPE html>
<html>
<head><title>Greeting</title></head>
<body>
    <p>Hello</p>
</body>
</html>"#
            .to_string()
    }

    pub fn create_form_page() -> String {
        r#"<!DOCTYPE html>
<html>
<body>
    <section>
        <h2>Contact</h2>
        <p>Send us a message</p>
        <button>Submit</button>
        <button>Submit</button>
    </section>
</body>
</html>"#
            .to_string()
    }

    pub fn create_excluded_page() -> String {
        r#"<!DOCTYPE html>
<html>
<body>
    <p>Translate me</p>
    <p class="no-translate">Brand Name</p>
    <p data-no-translate>Do not touch</p>
    <p>   </p>
</body>
</html>"#
            .to_string()
    }

    pub fn select_all(dom: &RcDom, selector: &str) -> Vec<Handle> {
        SelectorList::parse(selector)
            .expect("test selector should parse")
            .select_all(&dom.document)
    }

    pub fn select_one(dom: &RcDom, selector: &str) -> Handle {
        Self::select_all(dom, selector)
            .into_iter()
            .next()
            .unwrap_or_else(|| panic!("no element matches {}", selector))
    }

    pub fn text_of(dom: &RcDom, selector: &str) -> String {
        text_content(&Self::select_one(dom, selector)).trim().to_string()
    }

    pub fn classes_of(dom: &RcDom, selector: &str) -> Vec<String> {
        get_classes(&Self::select_one(dom, selector))
    }

    pub fn attr_of(dom: &RcDom, selector: &str, attr: &str) -> Option<String> {
        get_node_attr(&Self::select_one(dom, selector), attr)
    }

    pub fn serialize(dom: &RcDom) -> String {
        String::from_utf8(serialize_document(dom, "utf-8").expect("serialize should succeed"))
            .expect("output should be utf-8")
    }
}

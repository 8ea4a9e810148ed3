//! Star News Finder
//!
//! Finds news stories that fit a person's daily horoscope and writes them
//! up with some humor. The happy path extracts name and sign from the
//! user's text in one go. When the sign is missing the planner falls back
//! to extracting the name and asking the user for their sign through a form,
//! which is why that route carries a high cost.
//!
//! ```text
//! UserInput -> StarPerson -> Horoscope -> RelevantNewsStories -> Writeup
//!          \-> Person + Starry (form) -/
//! ```

pub mod horoscope;

pub use horoscope::{HoroscopeApiService, HoroscopeService};

use crate::capability::WEB;
use crate::config::StarNewsConfig;
use crate::llm::prompt::PromptRunner;
use crate::llm::LlmOptions;
use crate::registry::ActionRegistry;
use async_trait::async_trait;
use sdk::action::Action;
use sdk::errors::EngineError;
use sdk::types::{ActionError, ActionInputs, ActionOutcome, ActionSpec, InputRequest, TypeKey, Typed};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Free text supplied by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInput {
    pub content: String,
}

impl UserInput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

impl Typed for UserInput {
    const TYPE_KEY: &'static str = "UserInput";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
}

impl Typed for Person {
    const TYPE_KEY: &'static str = "Person";
}

/// Astrological details for a person
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Starry {
    pub sign: String,
}

impl Typed for Starry {
    const TYPE_KEY: &'static str = "Starry";
}

/// Person with astrology details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarPerson {
    pub name: String,
    pub sign: String,
}

impl Typed for StarPerson {
    const TYPE_KEY: &'static str = "StarPerson";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horoscope {
    pub summary: String,
}

impl Typed for Horoscope {
    const TYPE_KEY: &'static str = "Horoscope";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsStory {
    pub url: String,
    pub title: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevantNewsStories {
    pub items: Vec<NewsStory>,
}

impl Typed for RelevantNewsStories {
    const TYPE_KEY: &'static str = "RelevantNewsStories";
}

/// The finished piece, in Markdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Writeup {
    pub content: String,
}

impl Typed for Writeup {
    const TYPE_KEY: &'static str = "Writeup";
}

/// Tunables for the star news finder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarNewsSettings {
    pub story_count: usize,
    pub word_count: usize,
    /// Model for news search and the writeup
    pub model: String,
}

impl Default for StarNewsSettings {
    fn default() -> Self {
        Self::from(&StarNewsConfig::default())
    }
}

impl From<&StarNewsConfig> for StarNewsSettings {
    fn from(config: &StarNewsConfig) -> Self {
        Self {
            story_count: config.story_count,
            word_count: config.word_count,
            model: config.model.clone(),
        }
    }
}

/// Temperature for the writeup; it should read a little unpredictable
const WRITEUP_TEMPERATURE: f64 = 0.9;

/// Cost of asking the user for their sign
const MAKE_STARRY_COST: f64 = 100.0;

/// The star news finder's actions and their collaborators
pub struct StarNewsFinder {
    runner: Arc<PromptRunner>,
    horoscopes: Arc<dyn HoroscopeService>,
    settings: StarNewsSettings,
}

impl StarNewsFinder {
    pub fn new(
        runner: Arc<PromptRunner>,
        horoscopes: Arc<dyn HoroscopeService>,
        settings: StarNewsSettings,
    ) -> Self {
        Self {
            runner,
            horoscopes,
            settings,
        }
    }

    pub fn settings(&self) -> &StarNewsSettings {
        &self.settings
    }

    pub fn runner(&self) -> &Arc<PromptRunner> {
        &self.runner
    }

    /// Register every star news action, in planning-preference order
    pub fn register(self: &Arc<Self>, registry: &mut ActionRegistry) -> Result<(), EngineError> {
        for step in Step::ALL {
            registry.register(
                step.spec(),
                StarNewsAction {
                    finder: Arc::clone(self),
                    step,
                },
            )?;
        }
        Ok(())
    }

    /// Name and sign straight from the user's text, if both are there
    pub async fn extract_star_person(&self, input: &UserInput) -> Result<ActionOutcome, ActionError> {
        let prompt = format!(
            "Create a person from this user input, extracting their name and star sign:\n{}",
            input.content
        );
        self.runner
            .create_object_if_possible::<StarPerson>(&prompt, &LlmOptions::auto())
            .await
    }

    pub async fn extract_person(&self, input: &UserInput) -> Result<ActionOutcome, ActionError> {
        let prompt = format!(
            "Create a person from this user input, extracting their name:\n{}",
            input.content
        );
        self.runner
            .create_object_if_possible::<Person>(&prompt, &LlmOptions::auto())
            .await
    }

    /// Ask the user for their sign
    pub fn make_starry(&self, person: &Person) -> ActionOutcome {
        ActionOutcome::AwaitInput(
            InputRequest::form::<Starry>(format!(
                "Let's get some astrological details for {}",
                person.name
            ))
            .with_field("sign", "Star sign"),
        )
    }

    pub fn assemble_star_person(&self, person: &Person, starry: &Starry) -> StarPerson {
        StarPerson {
            name: person.name.clone(),
            sign: starry.sign.clone(),
        }
    }

    pub async fn retrieve_horoscope(&self, person: &StarPerson) -> Result<Horoscope, ActionError> {
        let summary = self
            .horoscopes
            .daily_horoscope(&person.sign)
            .await
            .map_err(|e| ActionError::recoverable(format!("{:#}", e)))?;

        Ok(Horoscope { summary })
    }

    pub async fn find_news_stories(
        &self,
        person: &StarPerson,
        horoscope: &Horoscope,
    ) -> Result<RelevantNewsStories, ActionError> {
        let prompt = news_prompt(person, horoscope, self.settings.story_count);
        let stories: RelevantNewsStories = self
            .runner
            .create_object(&prompt, &LlmOptions::by_name(&self.settings.model))
            .await?;

        debug!("Found {} news stories for {}", stories.items.len(), person.name);
        Ok(stories)
    }

    pub async fn star_news_writeup(
        &self,
        person: &StarPerson,
        stories: &RelevantNewsStories,
        horoscope: &Horoscope,
    ) -> Result<Writeup, ActionError> {
        let prompt = writeup_prompt(person, stories, horoscope, self.settings.word_count);
        let options = LlmOptions::by_name(&self.settings.model).with_temperature(WRITEUP_TEMPERATURE);

        self.runner.create_object(&prompt, &options).await
    }
}

fn news_prompt(person: &StarPerson, horoscope: &Horoscope, story_count: usize) -> String {
    format!(
        r#"{name} is an astrology believer with the sign {sign}.
Their horoscope for today is:
    <horoscope>{summary}</horoscope>
Given this, use web tools and generate search queries
to find {story_count} relevant news stories summarize them in a few sentences.
Include the URL for each story.
Do not look for another horoscope reading or return results directly about astrology;
find stories relevant to the reading above.

For example:
- If the horoscope says that they may
want to work on relationships, you could find news stories about
novel gifts
- If the horoscope says that they may want to work on their career,
find news stories about training courses.

Reply as {{"items": [{{"url": "...", "title": "...", "summary": "..."}}]}}."#,
        name = person.name,
        sign = person.sign,
        summary = horoscope.summary,
        story_count = story_count,
    )
}

fn writeup_prompt(
    person: &StarPerson,
    stories: &RelevantNewsStories,
    horoscope: &Horoscope,
    word_count: usize,
) -> String {
    let story_lines = stories
        .items
        .iter()
        .map(|story| format!("- {}: {}", story.url, story.summary))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Take the following news stories and write up something
amusing for the target person in {word_count} words.

Begin by summarizing their horoscope in a concise, amusing way, then
talk about the news. End with a surprising signoff.

{name} is an astrology believer with the sign {sign}.
Their horoscope for today is:
    <horoscope>{summary}</horoscope>
Relevant news stories are:
{story_lines}

Format it as Markdown with links. Reply as {{"content": "..."}}."#,
        word_count = word_count,
        name = person.name,
        sign = person.sign,
        summary = horoscope.summary,
        story_lines = story_lines,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    ExtractStarPerson,
    ExtractPerson,
    MakeStarry,
    AssembleStarPerson,
    RetrieveHoroscope,
    FindNewsStories,
    Writeup,
}

impl Step {
    const ALL: [Step; 7] = [
        Step::ExtractStarPerson,
        Step::ExtractPerson,
        Step::MakeStarry,
        Step::AssembleStarPerson,
        Step::RetrieveHoroscope,
        Step::FindNewsStories,
        Step::Writeup,
    ];

    fn spec(self) -> ActionSpec {
        match self {
            Step::ExtractStarPerson => ActionSpec::new("extract_star_person", TypeKey::of::<StarPerson>())
                .with_input(TypeKey::of::<UserInput>())
                .with_description("Extract name and star sign from user input"),
            Step::ExtractPerson => ActionSpec::new("extract_person", TypeKey::of::<Person>())
                .with_input(TypeKey::of::<UserInput>())
                .with_description("Extract a person's name from user input"),
            Step::MakeStarry => ActionSpec::new("make_starry", TypeKey::of::<Starry>())
                .with_input(TypeKey::of::<Person>())
                .with_cost(MAKE_STARRY_COST)
                .with_description("Ask the user for their star sign"),
            Step::AssembleStarPerson => ActionSpec::new("assemble_star_person", TypeKey::of::<StarPerson>())
                .with_input(TypeKey::of::<Person>())
                .with_input(TypeKey::of::<Starry>()),
            Step::RetrieveHoroscope => ActionSpec::new("retrieve_horoscope", TypeKey::of::<Horoscope>())
                .with_input(TypeKey::of::<StarPerson>())
                .with_description("Look up today's horoscope"),
            Step::FindNewsStories => {
                ActionSpec::new("find_news_stories", TypeKey::of::<RelevantNewsStories>())
                    .with_input(TypeKey::of::<StarPerson>())
                    .with_input(TypeKey::of::<Horoscope>())
                    .with_capability(WEB)
                    .with_description("Search the web for stories matching the horoscope")
            }
            Step::Writeup => ActionSpec::new("star_news_writeup", TypeKey::of::<Writeup>())
                .with_input(TypeKey::of::<StarPerson>())
                .with_input(TypeKey::of::<RelevantNewsStories>())
                .with_input(TypeKey::of::<Horoscope>())
                .achieves_goal(
                    "Create an amusing writeup for the target person based on their horoscope and current news stories",
                ),
        }
    }
}

struct StarNewsAction {
    finder: Arc<StarNewsFinder>,
    step: Step,
}

#[async_trait]
impl Action for StarNewsAction {
    async fn execute(&self, inputs: &ActionInputs) -> Result<ActionOutcome, ActionError> {
        let finder = &self.finder;
        match self.step {
            Step::ExtractStarPerson => finder.extract_star_person(&inputs.get_as()?).await,
            Step::ExtractPerson => finder.extract_person(&inputs.get_as()?).await,
            Step::MakeStarry => Ok(finder.make_starry(&inputs.get_as()?)),
            Step::AssembleStarPerson => {
                let person: Person = inputs.get_as()?;
                let starry: Starry = inputs.get_as()?;
                ActionOutcome::produced(&finder.assemble_star_person(&person, &starry))
            }
            Step::RetrieveHoroscope => {
                let horoscope = finder.retrieve_horoscope(&inputs.get_as()?).await?;
                ActionOutcome::produced(&horoscope)
            }
            Step::FindNewsStories => {
                let stories = finder
                    .find_news_stories(&inputs.get_as()?, &inputs.get_as()?)
                    .await?;
                ActionOutcome::produced(&stories)
            }
            Step::Writeup => {
                let writeup = finder
                    .star_news_writeup(&inputs.get_as()?, &inputs.get_as()?, &inputs.get_as()?)
                    .await?;
                ActionOutcome::produced(&writeup)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::router::ModelRouter;
    use crate::llm::{GenerateOptions, LLMProvider, Message, ModelSelectionCriteria};
    use serde_json::json;

    struct Canned(String);

    #[async_trait]
    impl LLMProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        fn models(&self) -> Vec<String> {
            vec!["gpt-4.1-mini".to_string()]
        }

        async fn generate(
            &self,
            _messages: &[Message],
            _options: &GenerateOptions,
        ) -> crate::llm::Result<String> {
            Ok(self.0.clone())
        }
    }

    struct Wolves;

    #[async_trait]
    impl HoroscopeService for Wolves {
        async fn daily_horoscope(&self, _sign: &str) -> anyhow::Result<String> {
            Ok("you will be chased by wolves".to_string())
        }
    }

    struct Offline;

    #[async_trait]
    impl HoroscopeService for Offline {
        async fn daily_horoscope(&self, _sign: &str) -> anyhow::Result<String> {
            anyhow::bail!("connection refused")
        }
    }

    fn finder(reply: &str, horoscopes: Arc<dyn HoroscopeService>) -> StarNewsFinder {
        let router = ModelRouter::new(vec![Arc::new(Canned(reply.to_string()))]);
        StarNewsFinder::new(
            Arc::new(PromptRunner::new(Arc::new(router))),
            horoscopes,
            StarNewsSettings::default(),
        )
    }

    fn lynda() -> StarPerson {
        StarPerson {
            name: "Lynda".to_string(),
            sign: "Scorpio".to_string(),
        }
    }

    #[tokio::test]
    async fn test_writeup_prompt_contains_key_data() {
        let finder = finder(r#"{"content": "Wolves, Lynda."}"#, Arc::new(Wolves));
        let cockatoos = NewsStory {
            url: "https://fake.com.au".to_string(),
            title: "Cockatoo behavior".to_string(),
            summary: "Cockatoos are eating cabbages".to_string(),
        };
        let emus = NewsStory {
            url: "https://morefake.com.au".to_string(),
            title: "Emu movements".to_string(),
            summary: "Emus are massing".to_string(),
        };
        let stories = RelevantNewsStories {
            items: vec![cockatoos.clone(), emus.clone()],
        };

        let writeup = finder
            .star_news_writeup(
                &lynda(),
                &stories,
                &Horoscope {
                    summary: "This is a good day for you".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(writeup.content, "Wolves, Lynda.");

        let call = finder.runner().last_call().unwrap();
        assert!(call.prompt.contains("Lynda"));
        assert!(call.prompt.contains("Scorpio"));
        assert!(call.prompt.contains(&cockatoos.summary));
        assert!(call.prompt.contains(&emus.summary));
        assert!(call.prompt.contains("100"));
        assert_eq!(call.options.temperature, Some(0.9));
        assert_eq!(
            call.options.criteria,
            ModelSelectionCriteria::ByName("gpt-4.1-mini".to_string())
        );
    }

    #[tokio::test]
    async fn test_news_prompt_asks_for_story_count() {
        let finder = finder(
            r#"{"items": [{"url": "https://x.test", "title": "Wolves", "summary": "Wolves sighted"}]}"#,
            Arc::new(Wolves),
        );
        let stories = finder
            .find_news_stories(
                &lynda(),
                &Horoscope {
                    summary: "you will be chased by wolves".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(stories.items.len(), 1);

        let call = finder.runner().last_call().unwrap();
        assert!(call.prompt.contains("find 5 relevant news stories"));
        assert!(call.prompt.contains("<horoscope>you will be chased by wolves</horoscope>"));
        assert_eq!(call.options.temperature, None);
    }

    #[tokio::test]
    async fn test_extract_star_person_without_sign_is_nothing() {
        let finder = finder("null", Arc::new(Wolves));
        let outcome = finder
            .extract_star_person(&UserInput::new("Lynda would like some news"))
            .await
            .unwrap();
        assert_eq!(outcome, ActionOutcome::Nothing);
        assert_eq!(
            finder.runner().last_call().unwrap().options.criteria,
            ModelSelectionCriteria::Auto
        );
    }

    #[tokio::test]
    async fn test_make_starry_requests_form() {
        let finder = finder("null", Arc::new(Wolves));
        let outcome = finder.make_starry(&Person {
            name: "Lynda".to_string(),
        });

        match outcome {
            ActionOutcome::AwaitInput(request) => {
                assert_eq!(request.prompt, "Let's get some astrological details for Lynda");
                assert_eq!(request.expected_type, TypeKey::new("Starry"));
                assert_eq!(request.fields[0].label, "Star sign");
            }
            other => panic!("expected form request, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_horoscope_failure_is_recoverable() {
        let finder = finder("null", Arc::new(Offline));
        let err = finder.retrieve_horoscope(&lynda()).await.unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.reason().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_register_order_and_specs() {
        let finder = Arc::new(finder("null", Arc::new(Wolves)));
        let mut registry = ActionRegistry::new();
        finder.register(&mut registry).unwrap();

        assert_eq!(
            registry.action_names(),
            vec![
                "extract_star_person",
                "extract_person",
                "make_starry",
                "assemble_star_person",
                "retrieve_horoscope",
                "find_news_stories",
                "star_news_writeup",
            ]
        );
        assert_eq!(registry.get("make_starry").unwrap().spec().cost, 100.0);
        assert!(registry
            .get("find_news_stories")
            .unwrap()
            .spec()
            .required_capabilities
            .contains(WEB));
        assert_eq!(registry.goals().len(), 1);

        // Registering twice collides on names
        assert!(matches!(
            finder.register(&mut registry),
            Err(EngineError::DuplicateAction(name)) if name == "extract_star_person"
        ));
    }

    #[tokio::test]
    async fn test_assemble_through_action_body() {
        let finder = Arc::new(finder("null", Arc::new(Wolves)));
        let mut registry = ActionRegistry::new();
        finder.register(&mut registry).unwrap();

        let inputs = ActionInputs::new()
            .with("Person", json!({"name": "Lynda"}))
            .with("Starry", json!({"sign": "Scorpio"}));
        let outcome = registry
            .get("assemble_star_person")
            .unwrap()
            .body()
            .execute(&inputs)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ActionOutcome::Produced(json!({"name": "Lynda", "sign": "Scorpio"}))
        );
    }
}

//! Composing an agent character from the selected modules.

use rand::Rng;
use serde_json::{Map, Value, json};

use crate::build::selection::BuildConfig;
use crate::error::{BabError, BabResult};
use crate::modules::ModuleRef;

const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";
const DEFAULT_VOICE_MODEL: &str = "eleven_multilingual_v2";
const DEFAULT_STABILITY: &str = "0.5";
const DEFAULT_SIMILARITY_BOOST: &str = "0.9";
const DEFAULT_STYLE: &str = "0.66";
const DEFAULT_SPEAKER_BOOST: &str = "false";
const DEFAULT_NAME: &str = "agent";

/// Upper bound (exclusive) of the suffix appended to the character name.
pub const NAME_SUFFIX_RANGE: u32 = 10_000;

/// Build the character document sent to `POST /agent/start`.
///
/// Knowledge module data is appended to the character's `knowledge` list,
/// a selected speech module sets `settings.voice`, and the name gets a
/// random `#n` suffix so every instantiation is distinct.
///
/// # Errors
/// Returns `NotReady` when no character is selected or its data is not an object.
pub fn compose_character<R: Rng>(config: &BuildConfig, rng: &mut R) -> BabResult<Value> {
    let character_module = config
        .character
        .as_ref()
        .ok_or_else(|| BabError::NotReady("no character module selected".to_string()))?;

    let mut character = match module_data(character_module) {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        _ => {
            return Err(BabError::NotReady(format!(
                "character module {} does not hold an object",
                character_module.on_chain_id
            )));
        }
    };

    if !config.knowledge.is_empty() {
        let mut knowledge = match character.remove("knowledge") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other],
        };
        for module in &config.knowledge {
            match module_data(module) {
                Value::Array(items) => knowledge.extend(items),
                Value::Null => {}
                other => knowledge.push(other),
            }
        }
        character.insert("knowledge".to_string(), Value::Array(knowledge));
    }

    if let Some(speech) = &config.speech {
        let data = module_data(speech);
        let block = data.get("elevenlabs").cloned().unwrap_or(Value::Null);
        let settings = character
            .entry("settings")
            .or_insert_with(|| Value::Object(Map::new()));
        if !settings.is_object() {
            *settings = Value::Object(Map::new());
        }
        if let Value::Object(settings) = settings {
            settings.insert("voice".to_string(), voice_settings(&block));
        }
    }

    let name = character
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_NAME)
        .to_string();
    let suffix = rng.gen_range(0..NAME_SUFFIX_RANGE);
    character.insert("name".to_string(), Value::String(format!("{name}#{suffix}")));

    Ok(Value::Object(character))
}

/// Module data, decoding content that was stored as a JSON string.
fn module_data(module: &ModuleRef) -> Value {
    match &module.data {
        Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())),
        Some(value) => value.clone(),
        None => Value::Null,
    }
}

/// Falsy values (missing, null, `false`, `""`, numeric zero) fall back to the
/// default. The string `"0"` is kept.
fn voice_settings(block: &Value) -> Value {
    let pick = |key: &str, default: &str| -> Value {
        match block.get(key) {
            None | Some(Value::Null | Value::Bool(false)) => Value::String(default.to_string()),
            Some(Value::String(s)) if s.is_empty() => Value::String(default.to_string()),
            Some(Value::Number(n)) if n.as_f64().is_some_and(|f| f == 0.0) => Value::String(default.to_string()),
            Some(value) => value.clone(),
        }
    };

    let model = pick("model", DEFAULT_VOICE_MODEL);
    json!({
        "model": model.clone(),
        "elevenlabs": {
            "voiceId": pick("voiceId", DEFAULT_VOICE_ID),
            "model": model,
            "stability": pick("stability", DEFAULT_STABILITY),
            "similarityBoost": pick("similarityBoost", DEFAULT_SIMILARITY_BOOST),
            "style": pick("style", DEFAULT_STYLE),
            "useSpeakerBoost": pick("useSpeakerBoost", DEFAULT_SPEAKER_BOOST),
        }
    })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::modules::ModuleType;

    fn config_with_character(data: Value) -> BuildConfig {
        let mut config = BuildConfig::default();
        config.select(ModuleRef::new(ModuleType::Character, "c1").with_data(data));
        config.select(ModuleRef::new(ModuleType::Memory, "m1"));
        config
    }

    fn compose(config: &BuildConfig) -> Value {
        let mut rng = StdRng::seed_from_u64(7);
        match compose_character(config, &mut rng) {
            Ok(character) => character,
            Err(err) => panic!("compose: {err}"),
        }
    }

    #[test]
    fn test_name_gets_numeric_suffix() {
        let character = compose(&config_with_character(json!({"name": "Eliza"})));
        let name = character["name"].as_str().unwrap_or_default();

        let suffix = name.strip_prefix("Eliza#").unwrap_or_default();
        assert!(suffix.parse::<u32>().is_ok_and(|n| n < NAME_SUFFIX_RANGE));
    }

    #[test]
    fn test_knowledge_is_flattened_onto_existing() {
        let mut config = config_with_character(json!({"name": "Eliza", "knowledge": ["base"]}));
        config.select(ModuleRef::new(ModuleType::Knowledge, "k1").with_data(json!(["a", "b"])));
        config.select(ModuleRef::new(ModuleType::Knowledge, "k2").with_data(json!("c")));

        let character = compose(&config);
        assert_eq!(character["knowledge"], json!(["base", "a", "b", "c"]));
    }

    #[test]
    fn test_speech_sets_voice_with_defaults() {
        let mut config = config_with_character(json!({"name": "Eliza", "settings": {"secrets": {}}}));
        config.select(
            ModuleRef::new(ModuleType::Speech, "s1")
                .with_data(json!({"elevenlabs": {"voiceId": "abc", "stability": 0.3}})),
        );

        let character = compose(&config);
        let voice = &character["settings"]["voice"];
        assert_eq!(voice["model"], DEFAULT_VOICE_MODEL);
        assert_eq!(voice["elevenlabs"]["voiceId"], "abc");
        assert_eq!(voice["elevenlabs"]["stability"], 0.3);
        assert_eq!(voice["elevenlabs"]["similarityBoost"], DEFAULT_SIMILARITY_BOOST);
        assert_eq!(voice["elevenlabs"]["useSpeakerBoost"], DEFAULT_SPEAKER_BOOST);
        assert!(character["settings"]["secrets"].is_object());
    }

    #[test]
    fn test_zero_voice_values_take_defaults() {
        let mut config = config_with_character(json!({"name": "Eliza"}));
        config.select(
            ModuleRef::new(ModuleType::Speech, "s1")
                .with_data(json!({"elevenlabs": {"stability": 0, "style": 0.0, "similarityBoost": "0"}})),
        );
        let character = compose(&config);

        let voice = &character["settings"]["voice"]["elevenlabs"];
        assert_eq!(voice["stability"], DEFAULT_STABILITY);
        assert_eq!(voice["style"], DEFAULT_STYLE);
        assert_eq!(voice["similarityBoost"], "0");
    }

    #[test]
    fn test_string_encoded_character_data() {
        let character = compose(&config_with_character(json!("{\"name\": \"Ada\", \"bio\": [\"x\"]}")));
        assert_eq!(character["bio"], json!(["x"]));
        assert!(character["name"].as_str().is_some_and(|n| n.starts_with("Ada#")));
    }

    #[test]
    fn test_missing_character_is_not_ready() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            compose_character(&BuildConfig::default(), &mut rng),
            Err(BabError::NotReady(_))
        ));
    }

    #[test]
    fn test_non_object_character_is_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let config = config_with_character(json!([1, 2]));
        assert!(compose_character(&config, &mut rng).is_err());
    }
}

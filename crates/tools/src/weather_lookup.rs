//! Weather lookup tool — returns canned weather for a small set of cities.
//!
//! There is no network access; the table below lets the agent loop and the
//! ReAct format be exercised end-to-end deterministically. Unknown cities
//! produce an unsuccessful result (not an error) so the model can recover.

use async_trait::async_trait;
use ragent_core::error::ToolError;
use ragent_core::tool::{Tool, ToolResult};

pub struct WeatherLookupTool;

struct CityWeather {
    city: &'static str,
    temperature_c: f64,
    conditions: &'static str,
    humidity: u32,
}

const WEATHER_TABLE: &[CityWeather] = &[
    CityWeather { city: "New York", temperature_c: 22.0, conditions: "Partly cloudy", humidity: 65 },
    CityWeather { city: "London", temperature_c: 18.0, conditions: "Clear", humidity: 45 },
    CityWeather { city: "Tokyo", temperature_c: 25.0, conditions: "Sunny", humidity: 70 },
    CityWeather { city: "Paris", temperature_c: 28.0, conditions: "Sunny", humidity: 60 },
];

fn find_city(location: &str) -> Option<&'static CityWeather> {
    let wanted = location.trim();
    WEATHER_TABLE.iter().find(|w| w.city.eq_ignore_ascii_case(wanted))
}

#[async_trait]
impl Tool for WeatherLookupTool {
    fn name(&self) -> &str {
        "weather_lookup"
    }

    fn description(&self) -> &str {
        "Look up current weather conditions for a city. Returns temperature, conditions and humidity."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city to look up weather for"
                },
                "units": {
                    "type": "string",
                    "enum": ["metric", "imperial"],
                    "description": "Temperature units (default: metric)"
                }
            },
            "required": ["location"],
            "additionalProperties": false
        })
    }

    fn output_schema(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "type": "object",
            "properties": {
                "location": { "type": "string" },
                "temperature": { "type": "number" },
                "units": { "type": "string", "enum": ["°C", "°F"] },
                "conditions": { "type": "string" },
                "humidity": { "type": "integer", "minimum": 0, "maximum": 100 }
            },
            "required": ["location", "temperature", "units", "conditions", "humidity"]
        }))
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let location = arguments["location"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'location' argument".into()))?;
        let imperial = arguments["units"].as_str() == Some("imperial");

        let Some(weather) = find_city(location) else {
            let available: Vec<&str> = WEATHER_TABLE.iter().map(|w| w.city).collect();
            return Ok(ToolResult::failure(format!(
                "Weather information not found for {location}. Available cities: {}",
                available.join(", ")
            )));
        };

        let (temperature, unit) = if imperial {
            (((weather.temperature_c * 9.0 / 5.0 + 32.0) * 10.0).round() / 10.0, "°F")
        } else {
            (weather.temperature_c, "°C")
        };
        let output = format!(
            "{}: {temperature}{unit}, {}, Humidity: {}%",
            weather.city, weather.conditions, weather.humidity
        );
        Ok(ToolResult::ok(output).with_data(serde_json::json!({
            "location": weather.city,
            "temperature": temperature,
            "units": unit,
            "conditions": weather.conditions,
            "humidity": weather.humidity,
        })))
    }
}

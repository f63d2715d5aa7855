mod bundle;
mod pull;
mod push;

use std::marker::PhantomData;
use std::sync::Arc;

use feedhub_core::{BundleSpec, FeedConfig, Flow, Home, OperationSpec, PullSpec, PushSpec, ReqwestHttpClient};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::cli::{Cli, Command, DirectionArg, HomeArg, OperationArgs};
use crate::error::CliError;

/// Parameters of an operation assembled from arguments.
#[derive(Debug, Clone, Serialize)]
pub struct RawParams {
    #[serde(skip)]
    pub command: String,
    #[serde(skip)]
    pub key: Option<String>,
    #[serde(flatten)]
    pub parameters: Map<String, Value>,
}

impl RawParams {
    pub fn from_args(args: &OperationArgs) -> Result<Self, CliError> {
        let mut parameters = Map::new();
        if let Some(id) = &args.id {
            parameters.insert(String::from("id"), Value::from(id.as_str()));
        }
        for pair in &args.params {
            let (key, value) = pair
                .split_once('=')
                .filter(|(key, _)| !key.is_empty())
                .ok_or_else(|| CliError::Usage(format!("parameter '{pair}' is not KEY=VALUE")))?;
            let value = serde_json::from_str(value).unwrap_or_else(|_| Value::from(value));
            parameters.insert(key.to_owned(), value);
        }

        Ok(Self {
            command: args.command.clone(),
            key: args.id.clone(),
            parameters,
        })
    }
}

/// An operation type whose command is chosen at run time.
pub struct RawCommand<F, H>(PhantomData<fn() -> (F, H)>);

impl<F: Flow, H: Home> OperationSpec for RawCommand<F, H> {
    const NAME: &'static str = "RawCommand";
    type Flow = F;
    type Home = H;
    type Params = RawParams;

    fn command(params: &RawParams) -> String {
        params.command.clone()
    }

    fn key(params: &RawParams) -> Option<String> {
        params.key.clone()
    }
}

impl<F: Flow, H: Home> PullSpec for RawCommand<F, H> {
    type Item = Value;
}

impl<F: Flow, H: Home> BundleSpec for RawCommand<F, H> {
    type Item = Value;

    fn item_key(item: &Value) -> Option<String> {
        match item.get("id")? {
            Value::String(id) => Some(id.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl<F: Flow, H: Home> PushSpec for RawCommand<F, H> {
    type Item = Value;
    type Receipt = Value;
}

/// Instantiates `$run` for the direction and home picked on the command line.
macro_rules! dispatch {
    ($args:expr, $($run:ident)::+, ($($arg:expr),*)) => {{
        use feedhub_core::{OfFeed, OfHub, TowardBackend, TowardFeed};
        match ($args.direction, $args.home) {
            (DirectionArg::ToFeed, HomeArg::Feed) => {
                $($run)::+::<RawCommand<TowardFeed, OfFeed>>($($arg),*).await
            }
            (DirectionArg::ToBackend, HomeArg::Feed) => {
                $($run)::+::<RawCommand<TowardBackend, OfFeed>>($($arg),*).await
            }
            (DirectionArg::ToFeed, HomeArg::Hub) => {
                $($run)::+::<RawCommand<TowardFeed, OfHub>>($($arg),*).await
            }
            (DirectionArg::ToBackend, HomeArg::Hub) => {
                $($run)::+::<RawCommand<TowardBackend, OfHub>>($($arg),*).await
            }
        }
    }};
}

pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    let mut config = FeedConfig::load(&cli.config)?;
    config.verbose |= cli.verbose;
    let feed = config.build(Arc::new(ReqwestHttpClient::new()))?;

    match &cli.command {
        Command::Pull(args) => {
            let params = RawParams::from_args(&args.operation)?;
            dispatch!(args.operation, pull::run, (feed, params))
        }
        Command::Bundle(args) => {
            let params = RawParams::from_args(&args.operation)?;
            dispatch!(args.operation, bundle::run, (feed, params, args))
        }
        Command::Push(args) => {
            let params = RawParams::from_args(&args.operation)?;
            let text = std::fs::read_to_string(&args.item)?;
            let item: Value = serde_json::from_str(&text)?;
            dispatch!(args.operation, push::run, (feed, params, item, args))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(params: &[&str]) -> OperationArgs {
        OperationArgs {
            command: String::from("getPatient"),
            direction: DirectionArg::ToFeed,
            home: HomeArg::Feed,
            id: Some(String::from("p-1")),
            params: params.iter().map(|p| (*p).to_owned()).collect(),
        }
    }

    #[test]
    fn params_keep_json_values_and_fall_back_to_strings() {
        let params = RawParams::from_args(&args(&["ward=3", "name=Ann", "tags=[1,2]"])).expect("params");

        let encoded = serde_json::to_value(&params).expect("encode");
        assert_eq!(
            encoded,
            serde_json::json!({"id": "p-1", "ward": 3, "name": "Ann", "tags": [1, 2]})
        );
        assert_eq!(params.key.as_deref(), Some("p-1"));
    }

    #[test]
    fn malformed_params_are_usage_errors() {
        let error = RawParams::from_args(&args(&["=oops"])).expect_err("no key");
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn bundle_items_are_keyed_by_id() {
        type Op = RawCommand<feedhub_core::TowardBackend, feedhub_core::OfHub>;
        assert_eq!(
            <Op as BundleSpec>::item_key(&serde_json::json!({"id": 7})).as_deref(),
            Some("7")
        );
        assert_eq!(<Op as OperationSpec>::DIRECTION, feedhub_core::Direction::ToBackend);
        assert!(!<Op as OperationSpec>::IS_OF_FEED);
        assert_eq!(<Op as BundleSpec>::CHUNK_MAX_ITEMS, 50);
    }
}

//! Resource Dispatch
//!
//! Table-driven create, read, update and delete of managed resources.

use super::expand::{build_body, path_params, ExpandError};
use super::flatten::flatten_item;
use super::registry::{ActionDef, ResourceDef};
use super::state::{Attributes, ReadOutcome, State};
use crate::cloud::{CloudError, ServiceClient};
use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};

fn template_url(
    client: &ServiceClient,
    template: &str,
    attrs: &Attributes,
    fixed: &[(&str, &str)],
) -> Result<String> {
    let params = path_params(template, attrs, fixed)?;
    let params: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    Ok(client.url_for(template, &params))
}

fn item_url(client: &ServiceClient, def: &ResourceDef, id: &str, attrs: &Attributes) -> Result<String> {
    template_url(client, &def.item_path, attrs, &[(def.id_param.as_str(), id)])
}

/// Attributes plus the object ID under `key`, for bodies that repeat the ID
fn with_id(attrs: &Attributes, key: &str, id: &str) -> Attributes {
    let mut attrs = attrs.clone();
    attrs.insert(key.to_string(), Value::String(id.to_string()));
    attrs
}

/// The operation the caller asked for, if any. Unknown values are rejected
/// before any request is sent.
fn requested_action<'a>(action: &ActionDef, attrs: &'a Attributes) -> Result<Option<&'a str>, ExpandError> {
    let Some(value) = attrs.get(&action.attr).filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    match value.as_str() {
        Some(value) if action.values.iter().any(|v| v == value) => Ok(Some(value)),
        _ => Err(ExpandError::InvalidChoice {
            attr: action.attr.clone(),
            value: value.to_string(),
            allowed: action.values.clone(),
        }),
    }
}

async fn run_action(
    client: &ServiceClient,
    def: &ResourceDef,
    action: &ActionDef,
    id: &str,
    attrs: &Attributes,
    operation: &str,
) -> Result<()> {
    let url = template_url(client, &action.path, attrs, &[(def.id_param.as_str(), id)])?;
    let mut body = Map::new();
    body.insert(action.body_key.clone(), Value::String(operation.to_string()));

    client
        .post(&url, Some(&Value::Object(body)))
        .await
        .with_context(|| format!("error running {} on {} {}", operation, def.display_name, id))?;
    tracing::info!("ran {} on {} {}", operation, def.display_name, id);
    Ok(())
}

/// Create a resource, then read it back
pub async fn create(client: &ServiceClient, def: &ResourceDef, attrs: &Attributes) -> Result<State> {
    let operation = match &def.action {
        Some(action) => requested_action(action, attrs)?.filter(|op| *op != action.initial),
        None => None,
    };

    let chosen_id = def.id_attr.as_ref().map(|attr| {
        let id = match attrs.get(attr).and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };
        (attr, id)
    });
    let body = match &chosen_id {
        Some((attr, id)) => build_body(&def.create_body, &with_id(attrs, attr, id))?,
        None => build_body(&def.create_body, attrs)?,
    };
    let url = template_url(client, &def.create_path, attrs, &[])?;

    let response = client
        .post(&url, Some(&body))
        .await
        .with_context(|| format!("error creating {}", def.display_name))?;

    let id = match (chosen_id, &def.id_path) {
        (Some((_, id)), _) => id,
        (None, Some(id_path)) => id_path
            .lookup_str(&response)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CloudError::MissingField(id_path.to_string()))
            .with_context(|| format!("unable to find the {} ID in the API response", def.display_name))?,
        (None, None) => return Err(anyhow!("{} has no way to learn the new ID", def.display_name)),
    };
    tracing::info!("created {} {}", def.display_name, id);

    if let (Some(action), Some(operation)) = (&def.action, operation) {
        run_action(client, def, action, &id, attrs, operation).await?;
    }

    match read(client, def, &id, attrs).await? {
        ReadOutcome::Present(state) => Ok(state),
        ReadOutcome::Gone => Err(anyhow!(
            "{} {} disappeared right after creation",
            def.display_name,
            id
        )),
    }
}

/// Read a resource. A missing object is [`ReadOutcome::Gone`], not an error.
pub async fn read(
    client: &ServiceClient,
    def: &ResourceDef,
    id: &str,
    attrs: &Attributes,
) -> Result<ReadOutcome> {
    let url = item_url(client, def, id, attrs)?;

    let response = match client.get(&url).await {
        Ok(response) => response,
        Err(e) if e.is_not_found() => {
            tracing::info!("{} {} is gone", def.display_name, id);
            return Ok(ReadOutcome::Gone);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("error retrieving {} {}", def.display_name, id))
        }
    };

    let Some(object @ Value::Object(_)) = def.read_root.lookup(&response) else {
        tracing::info!(
            "{} {} has no `{}` in the response, treating it as gone",
            def.display_name,
            id,
            def.read_root
        );
        return Ok(ReadOutcome::Gone);
    };

    let mut attributes = flatten_item(object, &def.fields);
    if let Some(action) = &def.action {
        if let Some(status_path) = &action.status_path {
            let status = status_path.lookup_str(object).unwrap_or_default();
            let current = action.from_status.get(&status).unwrap_or(&action.initial);
            attributes.insert(action.attr.clone(), Value::String(current.clone()));
        }
    }
    Ok(ReadOutcome::Present(State::new(id, attributes)))
}

/// Update a resource, then read it back.
///
/// With an action: a non-empty update body is sent first, which leaves the
/// object in the action's initial state, so the requested operation is only
/// posted when it differs from that. An update carrying nothing but the
/// operation posts it as-is.
pub async fn update(
    client: &ServiceClient,
    def: &ResourceDef,
    id: &str,
    attrs: &Attributes,
) -> Result<State> {
    let operation = match &def.action {
        Some(action) => requested_action(action, attrs)?,
        None => None,
    };

    let updated = if def.update_steps.is_empty() {
        update_item(client, def, id, attrs).await?
    } else {
        update_in_steps(client, def, id, attrs).await?
    };

    if let (Some(action), Some(operation)) = (&def.action, operation) {
        if !updated || operation != action.initial {
            run_action(client, def, action, id, attrs, operation).await?;
        }
    }

    read(client, def, id, attrs)
        .await?
        .into_state()
        .ok_or_else(|| anyhow!("{} {} disappeared during update", def.display_name, id))
}

/// Single request against the item URL. Returns whether it was sent.
async fn update_item(client: &ServiceClient, def: &ResourceDef, id: &str, attrs: &Attributes) -> Result<bool> {
    let body = build_body(&def.update_body, attrs)?;
    let empty = body.as_object().is_some_and(Map::is_empty);
    if def.action.is_some() && empty {
        return Ok(false);
    }

    let url = item_url(client, def, id, attrs)?;
    client
        .request(def.update_method.as_method(), &url, Some(&body))
        .await
        .with_context(|| format!("error updating {} {}", def.display_name, id))?;
    tracing::info!("updated {} {}", def.display_name, id);
    Ok(true)
}

/// One request per step whose trigger attributes are set
async fn update_in_steps(
    client: &ServiceClient,
    def: &ResourceDef,
    id: &str,
    attrs: &Attributes,
) -> Result<bool> {
    let attrs = with_id(attrs, &def.id_param, id);
    let mut sent = false;

    for step in &def.update_steps {
        let triggered = step
            .when
            .iter()
            .any(|attr| attrs.get(attr).is_some_and(|v| !v.is_null()));
        if !triggered {
            continue;
        }

        let url = template_url(client, &step.path, &attrs, &[])?;
        let body = build_body(&step.body, &attrs)?;
        client
            .request(step.method.as_method(), &url, Some(&body))
            .await
            .with_context(|| format!("error updating {} {} ({})", def.display_name, id, step.when.join(", ")))?;
        tracing::debug!("updated {} of {} {}", step.when.join(", "), def.display_name, id);
        sent = true;
    }

    if sent {
        tracing::info!("updated {} {}", def.display_name, id);
    } else {
        tracing::debug!("nothing to update on {} {}", def.display_name, id);
    }
    Ok(sent)
}

/// Delete a resource. Deleting an object that no longer exists succeeds.
pub async fn delete(
    client: &ServiceClient,
    def: &ResourceDef,
    id: &str,
    attrs: &Attributes,
) -> Result<()> {
    let url = item_url(client, def, id, attrs)?;

    match client.delete(&url).await {
        Ok(_) => {
            tracing::info!("deleted {} {}", def.display_name, id);
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            tracing::info!("{} {} was already deleted", def.display_name, id);
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("error deleting {} {}", def.display_name, id)),
    }
}

use super::*;

impl GrantService {
    /// Returns the argument schema of a deployed provider.
    pub fn get_provider_arg_schema(&self, provider_id: &str) -> AppResult<ArgSchema> {
        let entry = self.providers.get(provider_id)?;
        entry
            .accessor()
            .as_arg_schemarer()
            .map(|schemarer| schemarer.arg_schema())
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "provider '{provider_id}' does not describe its arguments"
                ))
            })
    }

    /// Lists the values an argument accepts.
    ///
    /// `filters` maps a group identifier to group values; an option is kept
    /// when, for every filter, it belongs to at least one selected group value.
    pub async fn list_provider_arg_options(
        &self,
        provider_id: &str,
        arg_id: &str,
        filters: &BTreeMap<String, Vec<String>>,
    ) -> AppResult<ArgOptions> {
        let schema = self.get_provider_arg_schema(provider_id)?;
        let descriptor = schema
            .args
            .get(arg_id)
            .ok_or_else(|| AppError::InvalidArgument {
                argument: arg_id.to_owned(),
                reason: format!("not accepted by provider '{provider_id}'"),
            })?;

        if let Some(filter) = filters
            .keys()
            .find(|filter| !descriptor.groups.contains_key(filter.as_str()))
        {
            return Err(AppError::InvalidFilter {
                filter: filter.clone(),
                reason: format!("argument '{arg_id}' has no such group"),
            });
        }

        let entry = self.providers.get(provider_id)?;
        let optioner = match entry.accessor().as_arg_optioner() {
            Some(optioner) if descriptor.has_options => optioner,
            _ => {
                return Err(AppError::InvalidArgument {
                    argument: arg_id.to_owned(),
                    reason: "argument does not support listing options".to_owned(),
                });
            }
        };

        let mut options = optioner.options(arg_id).await?;
        apply_filters(&mut options, filters);
        Ok(options)
    }
}

/// Rejects unknown arguments and missing required ones.
///
/// Providers without a schema accept any arguments.
pub(super) fn check_arguments(entry: &ProviderEntry, args: &GrantArgs) -> AppResult<()> {
    let Some(schemarer) = entry.accessor().as_arg_schemarer() else {
        return Ok(());
    };
    let schema = schemarer.arg_schema();

    if let Some(unknown) = args.keys().find(|key| !schema.args.contains_key(key.as_str())) {
        return Err(AppError::InvalidArgument {
            argument: unknown.clone(),
            reason: format!("not accepted by provider '{}'", entry.id()),
        });
    }

    if let Some(missing) = schema
        .args
        .values()
        .find(|descriptor| descriptor.required && !args.contains_key(&descriptor.id))
    {
        return Err(AppError::InvalidArgument {
            argument: missing.id.clone(),
            reason: "required argument is missing".to_owned(),
        });
    }

    Ok(())
}

fn apply_filters(options: &mut ArgOptions, filters: &BTreeMap<String, Vec<String>>) {
    for (group_id, selected) in filters {
        if selected.is_empty() {
            continue;
        }

        let allowed: Vec<&str> = options
            .groups
            .get(group_id)
            .into_iter()
            .flatten()
            .filter(|group| selected.contains(&group.value))
            .flat_map(|group| group.children.iter().map(String::as_str))
            .collect();

        let kept = options
            .options
            .iter()
            .filter(|option| allowed.contains(&option.value.as_str()))
            .cloned()
            .collect();
        options.options = kept;
    }
}

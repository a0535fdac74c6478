/// Returns true when any entry of `audience` also appears in `inputs`.
///
/// With `ignore_case` set, both sides are compared after lowercasing. An empty list on either side
/// never intersects.
pub(crate) fn intersects<A, I>(audience: &[A], inputs: &[I], ignore_case: bool) -> bool
where
    A: AsRef<str>,
    I: AsRef<str>,
{
    if audience.is_empty() || inputs.is_empty() {
        return false;
    }

    if ignore_case {
        let lowercase_inputs: Vec<String> =
            inputs.iter().map(|i| i.as_ref().to_lowercase()).collect();
        return audience
            .iter()
            .any(|a| lowercase_inputs.contains(&a.as_ref().to_lowercase()));
    }

    audience
        .iter()
        .any(|a| inputs.iter().any(|i| i.as_ref() == a.as_ref()))
}

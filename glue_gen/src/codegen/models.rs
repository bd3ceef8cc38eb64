/* Record and variant classes of a namespace's types file.

   Every class wraps its positional wire value in `_f`. Records expose typed
   getters and setters per field and one static constructor per profile;
   variants expose the ordinal, a predicate and accessor per case and one
   static constructor per case. */

use super::emitter::Emitter;
use super::naming::{member_name, type_name};
use super::typescript::{RUNTIME_ALIAS, Scope};
use crate::error::BuildResult;
use glue_types::{Field, Namespace, Record, TypeKey, Variant, qualified_name};

fn doc_comment(e: &mut Emitter, description: Option<&str>, deprecated: bool) {
  if description.is_none() && !deprecated {
    return;
  }
  e.line("/**");
  if let Some(description) = description {
    for line in description.lines() {
      e.line(format!(" * {}", line));
    }
  }
  if deprecated {
    e.line(" * @deprecated");
  }
  e.line(" */");
}

fn model_header(e: &mut Emitter, name: &str, ns: u16, type_id: u16) {
  e.open(format!("export class {} implements {}.Model {{", name, RUNTIME_ALIAS));
  e.line(format!("static readonly NS_ID = {}", ns));
  e.line(format!("static readonly TYPE_ID = {}", type_id));
}

fn model_footer(e: &mut Emitter, name: &str, ns: u16, type_id: u16) {
  e.blank();
  e.open("nsId(): number {")
    .line(format!("return {}.NS_ID", name))
    .close("}")
    .blank();
  e.open("typeId(): number {")
    .line(format!("return {}.TYPE_ID", name))
    .close("}")
    .blank();
  e.open("marshal(): string {")
    .line("return JSON.stringify(this._f)")
    .close("}")
    .blank();
  e.open(format!("static unmarshal(s: string): {} {{", name))
    .line(format!("return new {}(JSON.parse(s))", name))
    .close("}")
    .blank();
  e.open(format!("copy(): {} {{", name))
    .line(format!("return {}.unmarshal(this.marshal())", name))
    .close("}");
  e.close("}").blank();
  e.line(format!("export const __model_{}_{} = {}", ns, type_id, name));
  e.blank();
}

/* One wire slot per id up to the highest field id; gaps hold null */
fn slots(record: &Record) -> impl Iterator<Item = (usize, Option<&Field>)> {
  (0..record.wire_len()).map(|slot| {
    let field = u16::try_from(slot)
      .ok()
      .and_then(|id| record.fields.get(&id));
    (slot, field)
  })
}

pub fn emit_record(e: &mut Emitter, scope: &Scope, ns: &Namespace, record: &Record) -> BuildResult<()> {
  let name = type_name(&record.name);
  let qualified = qualified_name(&ns.name, &record.name);
  let key = TypeKey::new(ns.id, record.id);

  e.open(format!("export type _fields_{} = [", name));
  for (_, field) in slots(record) {
    match field {
      Some(field) => e.line(format!("{},", scope.wire_type(&field.ty)?)),
      None => e.line("null,"),
    };
  }
  e.close("]").blank();

  /* Profile 0 accepts any subset of fields; the others exactly their own */
  e.open(format!("export interface __profile_{}_0 {{", name));
  for field in record.fields.values() {
    e.line(format!("{}?: {}", member_name(&field.name), scope.class_type(&field.ty)?));
  }
  e.close("}").blank();
  for profile in record.profiles.values() {
    e.open(format!("export interface __profile_{}_{} {{", name, profile.id));
    for id in &profile.fields {
      if let Some(field) = record.fields.get(id) {
        e.line(format!("{}: {}", member_name(&field.name), scope.class_type(&field.ty)?));
      }
    }
    e.close("}").blank();
  }

  let nominal = scope.resolved.has_nominal_id(key);
  if nominal {
    e.line(format!("enum __id_{} {{}}", name));
    e.line(format!("export type {}Id = __id_{} & string", name, name));
    e.blank();
  }

  doc_comment(e, record.description.as_deref(), false);
  model_header(e, &name, ns.id, record.id);
  e.line(format!("_f: _fields_{}", name)).blank();

  e.open("constructor(o: unknown[] = []) {");
  e.open("if (!Array.isArray(o)) {")
    .line(format!(
      "throw new TypeError(\"{}: expected a positional array\")",
      qualified
    ))
    .close("}");
  e.open("this._f = [");
  for (slot, field) in slots(record) {
    match field {
      Some(field) => e.line(format!(
        "o.length > {} ? o[{}] : {},",
        slot,
        slot,
        scope.default_wire(&field.ty)?
      )),
      None => e.line("null,"),
    };
  }
  e.close(format!("] as _fields_{}", name));
  e.close("}");

  e.blank();
  e.open(format!(
    "static V0(p: __profile_{}_0 = {{}}): {} {{",
    name, name
  ));
  e.open(format!("return new {}([", name));
  for (_, field) in slots(record) {
    match field {
      Some(field) => {
        let member = format!("p.{}", member_name(&field.name));
        e.line(format!(
          "{} !== undefined ? {} : {},",
          member,
          scope.serialize(&field.ty, &member, 0)?,
          scope.default_wire(&field.ty)?
        ))
      }
      None => e.line("null,"),
    };
  }
  e.close("])");
  e.close("}");

  for profile in record.profiles.values() {
    e.blank();
    e.open(format!(
      "static V{}(p: __profile_{}_{}): {} {{",
      profile.id, name, profile.id, name
    ));
    e.open(format!("return new {}([", name));
    for (_, field) in slots(record) {
      match field {
        Some(field) if profile.fields.contains(&field.id) => {
          let member = format!("p.{}", member_name(&field.name));
          e.line(format!("{},", scope.serialize(&field.ty, &member, 0)?))
        }
        Some(field) => e.line(format!("{},", scope.default_wire(&field.ty)?)),
        None => e.line("null,"),
      };
    }
    e.close("])");
    e.close("}");
  }

  if nominal {
    e.blank();
    e.open(format!("static newId(): {}Id {{", name))
      .line(format!("return {}.uuidv7() as {}Id", RUNTIME_ALIAS, name))
      .close("}");
  }

  for field in record.fields.values() {
    let accessor = type_name(&field.name);
    let class_type = scope.class_type(&field.ty)?;
    e.blank();
    doc_comment(e, field.description.as_deref(), field.meta.deprecated);
    e.open(format!("get{}(): {} {{", accessor, class_type))
      .line(format!("const f = this._f[{}]", field.id))
      .line(format!("return {}", scope.deserialize(&field.ty, "f", 0)?))
      .close("}")
      .blank();
    doc_comment(e, None, field.meta.deprecated);
    e.open(format!("set{}(v: {}): this {{", accessor, class_type))
      .line(format!("this._f[{}] = {}", field.id, scope.serialize(&field.ty, "v", 0)?))
      .line("return this")
      .close("}");
  }

  model_footer(e, &name, ns.id, record.id);
  Ok(())
}

pub fn emit_variant(e: &mut Emitter, scope: &Scope, ns: &Namespace, variant: &Variant) -> BuildResult<()> {
  let name = type_name(&variant.name);
  let qualified = qualified_name(&ns.name, &variant.name);

  e.line(format!("export type _fields_{} =", name));
  e.indent();
  if variant.values.is_empty() {
    e.line("never");
  }
  for value in variant.values.values() {
    match &value.payload {
      Some(payload) => e.line(format!("| [{}, {}]", value.ordinal, scope.wire_type(payload)?)),
      None => e.line(format!("| [{}]", value.ordinal)),
    };
  }
  e.dedent().blank();

  doc_comment(e, variant.description.as_deref(), false);
  model_header(e, &name, ns.id, variant.id);
  e.open("static readonly ORDINALS = {");
  for value in variant.values.values() {
    e.line(format!("{}: {},", member_name(&value.name), value.ordinal));
  }
  e.close("} as const");
  e.line(format!("_f: _fields_{}", name)).blank();

  e.open("constructor(o: unknown[] = []) {")
    .line(format!("this._f = {}.decode(o)", name))
    .close("}")
    .blank();

  e.open(format!("private static decode(o: unknown[]): _fields_{} {{", name));
  e.open("if (!Array.isArray(o)) {")
    .line(format!(
      "throw new TypeError(\"{}: expected a positional array\")",
      qualified
    ))
    .close("}");
  e.open("if (o.length === 0) {");
  match variant.default_value() {
    Some(value) => match &value.payload {
      Some(payload) => e.line(format!(
        "return [{}, {}]",
        value.ordinal,
        scope.default_wire(payload)?
      )),
      None => e.line(format!("return [{}]", value.ordinal)),
    },
    None => e.line(format!("throw new RangeError(\"{}: no cases declared\")", qualified)),
  };
  e.close("}");
  e.open("switch (o[0]) {");
  for value in variant.values.values() {
    e.open(format!("case {}:", value.ordinal));
    match &value.payload {
      Some(payload) => {
        e.open("if (o.length < 2) {")
          .line(format!(
            "throw new TypeError(\"{}: case {} requires a payload\")",
            qualified, value.ordinal
          ))
          .close("}");
        e.line(format!(
          "return [{}, o[1] as {}]",
          value.ordinal,
          scope.wire_type(payload)?
        ));
      }
      None => {
        e.line(format!("return [{}]", value.ordinal));
      }
    }
    e.dedent();
  }
  e.open("default:")
    .line(format!(
      "throw new RangeError(`{}: unknown ordinal ${{String(o[0])}}`)",
      qualified
    ))
    .dedent();
  e.close("}");
  e.close("}").blank();

  e.open("ordinal(): number {")
    .line("return this._f[0]")
    .close("}");

  for value in variant.values.values() {
    let case = type_name(&value.name);
    e.blank();
    e.open(format!("is{}(): boolean {{", case))
      .line(format!("return this._f[0] === {}", value.ordinal))
      .close("}")
      .blank();

    match &value.payload {
      Some(payload) => {
        let class_type = scope.class_type(payload)?;
        let accessor_type = if payload.is_nullable() {
          class_type.clone()
        } else {
          format!("{} | null", class_type)
        };
        e.open(format!("as{}(): {} {{", case, accessor_type));
        e.open(format!("if (this._f[0] !== {}) {{", value.ordinal))
          .line("return null")
          .close("}");
        e.line(format!(
          "const p = (this._f as unknown[])[1] as {}",
          scope.wire_type(payload)?
        ));
        e.line(format!("return {}", scope.deserialize(payload, "p", 0)?));
        e.close("}").blank();

        e.open(format!("static {}(p: {}): {} {{", case, class_type, name))
          .line(format!(
            "return new {}([{}, {}])",
            name,
            value.ordinal,
            scope.serialize(payload, "p", 0)?
          ))
          .close("}");
      }
      None => {
        e.open(format!("static {}(): {} {{", case, name))
          .line(format!("return new {}([{}])", name, value.ordinal))
          .close("}");
      }
    }
  }

  model_footer(e, &name, ns.id, variant.id);
  Ok(())
}

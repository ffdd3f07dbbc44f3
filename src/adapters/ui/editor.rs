use crate::domain::roi::{palette_color, Roi, MIN_ROI_SIZE};

/// Herramienta activa del editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Rectangle,
    Select,
}

/// Estado explícito de la máquina del editor. `Drawing` vive entre el
/// pointer-down y el pointer-up de la herramienta rectángulo; `Selected`
/// mantiene el índice del ROI elegido y, mientras se arrastra, el último
/// punto visto.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorState {
    Idle,
    Drawing {
        start: (f32, f32),
        current: (f32, f32),
    },
    Selected {
        index: usize,
        drag_last: Option<(f32, f32)>,
    },
}

/// Resultado de una transición, para que la vista decida avisos y repintado.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorAction {
    None,
    /// Rectángulo confirmado; índice del ROI nuevo.
    Committed(usize),
    /// Rectángulo por debajo del tamaño mínimo, descartado.
    Discarded,
    Selected(usize),
    SelectionCleared,
    Moved,
    Deleted(usize),
}

/// Máquina de estados del editor de ROIs. No sabe nada del canvas: recibe
/// coordenadas y mantiene la lista de regiones y la bandera de cambios sin
/// guardar.
pub struct RoiEditor {
    tool: Tool,
    state: EditorState,
    rois: Vec<Roi>,
    dirty: bool,
    color_cursor: usize,
}

impl RoiEditor {
    pub fn new() -> Self {
        Self {
            tool: Tool::Rectangle,
            state: EditorState::Idle,
            rois: Vec::new(),
            dirty: false,
            color_cursor: 0,
        }
    }

    /// Carga la lista de un RoiConfig y deja el editor limpio.
    pub fn load(&mut self, rois: Vec<Roi>) {
        self.color_cursor = rois.len();
        self.rois = rois;
        self.state = EditorState::Idle;
        self.dirty = false;
    }

    pub fn rois(&self) -> &[Roi] {
        &self.rois
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Cambiar a la herramienta rectángulo suelta la selección.
    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
        if tool == Tool::Rectangle {
            self.state = EditorState::Idle;
        }
    }

    pub fn selected_index(&self) -> Option<usize> {
        match self.state {
            EditorState::Selected { index, .. } => Some(index),
            _ => None,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    /// Marca cambios que no pasan por la máquina (p. ej. el fondo).
    pub fn touch(&mut self) {
        self.dirty = true;
    }

    /// Selección directa desde la lista lateral.
    pub fn select(&mut self, index: usize) {
        if index < self.rois.len() {
            self.tool = Tool::Select;
            self.state = EditorState::Selected {
                index,
                drag_last: None,
            };
        }
    }

    /// Rectángulo provisional normalizado, mientras se dibuja.
    pub fn drawing_preview(&self) -> Option<(f32, f32, f32, f32)> {
        match self.state {
            EditorState::Drawing { start, current } => Some((
                start.0.min(current.0),
                start.1.min(current.1),
                start.0.max(current.0),
                start.1.max(current.1),
            )),
            _ => None,
        }
    }

    pub fn pointer_down(&mut self, x: f32, y: f32) -> EditorAction {
        match self.tool {
            Tool::Rectangle => {
                self.state = EditorState::Drawing {
                    start: (x, y),
                    current: (x, y),
                };
                EditorAction::None
            }
            Tool::Select => {
                // Primer ROI que contiene el punto, en orden de lista.
                if let Some(index) = self.rois.iter().position(|r| r.contains(x, y)) {
                    self.state = EditorState::Selected {
                        index,
                        drag_last: Some((x, y)),
                    };
                    EditorAction::Selected(index)
                } else {
                    let had_selection = self.selected_index().is_some();
                    self.state = EditorState::Idle;
                    if had_selection {
                        EditorAction::SelectionCleared
                    } else {
                        EditorAction::None
                    }
                }
            }
        }
    }

    pub fn pointer_move(&mut self, x: f32, y: f32) -> EditorAction {
        match &mut self.state {
            EditorState::Drawing { current, .. } => {
                *current = (x, y);
                EditorAction::None
            }
            EditorState::Selected {
                index,
                drag_last: Some(last),
            } => {
                let (dx, dy) = (x - last.0, y - last.1);
                if dx == 0.0 && dy == 0.0 {
                    return EditorAction::None;
                }
                *last = (x, y);
                let index = *index;
                self.rois[index].translate(dx, dy);
                self.dirty = true;
                EditorAction::Moved
            }
            _ => EditorAction::None,
        }
    }

    pub fn pointer_up(&mut self) -> EditorAction {
        match self.state.clone() {
            EditorState::Drawing { start, current } => {
                self.state = EditorState::Idle;
                let width = (current.0 - start.0).abs();
                let height = (current.1 - start.1).abs();
                if width < MIN_ROI_SIZE || height < MIN_ROI_SIZE {
                    return EditorAction::Discarded;
                }

                let color = palette_color(self.color_cursor);
                self.color_cursor += 1;
                let roi =
                    Roi::rectangle(start.0, start.1, current.0, current.1, color).normalized();
                self.rois.push(roi);
                self.dirty = true;
                // Tras un trazo válido se pasa a seleccionar, como en el
                // flujo de dibujo original.
                self.tool = Tool::Select;
                EditorAction::Committed(self.rois.len() - 1)
            }
            EditorState::Selected { index, .. } => {
                // Fin del arrastre; la selección se conserva.
                self.state = EditorState::Selected {
                    index,
                    drag_last: None,
                };
                EditorAction::None
            }
            EditorState::Idle => EditorAction::None,
        }
    }

    /// Elimina el ROI seleccionado, exactamente ese índice, y limpia la
    /// selección.
    pub fn delete_selected(&mut self) -> EditorAction {
        if let EditorState::Selected { index, .. } = self.state {
            self.rois.remove(index);
            self.state = EditorState::Idle;
            self.dirty = true;
            EditorAction::Deleted(index)
        } else {
            EditorAction::None
        }
    }

    /// Vacía la lista completa de ROIs.
    pub fn clear(&mut self) {
        self.rois.clear();
        self.state = EditorState::Idle;
        self.dirty = true;
    }
}

impl Default for RoiEditor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw_rect(editor: &mut RoiEditor, x1: f32, y1: f32, x2: f32, y2: f32) -> EditorAction {
        editor.set_tool(Tool::Rectangle);
        editor.pointer_down(x1, y1);
        editor.pointer_move(x2, y2);
        editor.pointer_up()
    }

    #[test]
    fn rectangle_below_minimum_is_discarded_in_either_dimension() {
        let mut editor = RoiEditor::new();

        // Ancho insuficiente.
        assert_eq!(draw_rect(&mut editor, 10.0, 10.0, 19.0, 60.0), EditorAction::Discarded);
        // Alto insuficiente.
        assert_eq!(draw_rect(&mut editor, 10.0, 10.0, 60.0, 19.0), EditorAction::Discarded);
        // Ambos insuficientes (un click suelto).
        assert_eq!(draw_rect(&mut editor, 10.0, 10.0, 10.0, 10.0), EditorAction::Discarded);

        assert!(editor.rois().is_empty());
        assert_eq!(*editor.state(), EditorState::Idle);
    }

    #[test]
    fn valid_rectangle_commits_normalized_and_switches_to_select() {
        let mut editor = RoiEditor::new();
        // Dibujado de abajo-derecha a arriba-izquierda.
        let action = draw_rect(&mut editor, 120.0, 90.0, 20.0, 30.0);
        assert_eq!(action, EditorAction::Committed(0));
        assert_eq!(editor.tool(), Tool::Select);
        assert!(editor.is_dirty());
        assert_eq!(editor.rois()[0].bounds(), (20.0, 30.0, 120.0, 90.0));
    }

    #[test]
    fn select_hits_first_roi_in_list_order() {
        let mut editor = RoiEditor::new();
        draw_rect(&mut editor, 0.0, 0.0, 100.0, 100.0);
        editor.set_tool(Tool::Rectangle);
        draw_rect(&mut editor, 50.0, 50.0, 150.0, 150.0);

        // El punto (60, 60) cae en ambos; gana el primero de la lista.
        assert_eq!(editor.pointer_down(60.0, 60.0), EditorAction::Selected(0));
        assert_eq!(editor.selected_index(), Some(0));

        // Fuera de todos: se limpia la selección.
        editor.pointer_up();
        assert_eq!(editor.pointer_down(500.0, 500.0), EditorAction::SelectionCleared);
        assert_eq!(editor.selected_index(), None);
    }

    #[test]
    fn delete_selected_removes_exactly_that_index() {
        let mut editor = RoiEditor::new();
        draw_rect(&mut editor, 0.0, 0.0, 50.0, 50.0);
        editor.set_tool(Tool::Rectangle);
        draw_rect(&mut editor, 200.0, 0.0, 260.0, 50.0);
        editor.set_tool(Tool::Rectangle);
        draw_rect(&mut editor, 0.0, 200.0, 50.0, 260.0);
        assert_eq!(editor.rois().len(), 3);

        editor.pointer_down(210.0, 10.0);
        editor.pointer_up();
        assert_eq!(editor.delete_selected(), EditorAction::Deleted(1));

        assert_eq!(editor.rois().len(), 2);
        assert_eq!(editor.selected_index(), None);
        assert_eq!(editor.rois()[0].bounds(), (0.0, 0.0, 50.0, 50.0));
        assert_eq!(editor.rois()[1].bounds(), (0.0, 200.0, 50.0, 260.0));
    }

    #[test]
    fn delete_without_selection_does_nothing() {
        let mut editor = RoiEditor::new();
        draw_rect(&mut editor, 0.0, 0.0, 50.0, 50.0);
        assert_eq!(editor.delete_selected(), EditorAction::None);
        assert_eq!(editor.rois().len(), 1);
    }

    #[test]
    fn dragging_translates_the_selected_roi() {
        let mut editor = RoiEditor::new();
        draw_rect(&mut editor, 10.0, 10.0, 60.0, 60.0);
        editor.mark_saved();

        editor.pointer_down(30.0, 30.0);
        assert_eq!(editor.pointer_move(40.0, 35.0), EditorAction::Moved);
        editor.pointer_up();

        assert_eq!(editor.rois()[0].bounds(), (20.0, 15.0, 70.0, 65.0));
        assert!(editor.is_dirty());
        // Sigue seleccionado después de soltar.
        assert_eq!(editor.selected_index(), Some(0));
    }

    #[test]
    fn load_resets_dirty_and_selection() {
        let mut editor = RoiEditor::new();
        draw_rect(&mut editor, 0.0, 0.0, 50.0, 50.0);
        assert!(editor.is_dirty());

        editor.load(vec![crate::domain::roi::Roi::rectangle(
            5.0, 5.0, 30.0, 30.0, "#007bff",
        )]);
        assert!(!editor.is_dirty());
        assert_eq!(editor.selected_index(), None);
        assert_eq!(editor.rois().len(), 1);
    }

    #[test]
    fn committed_rois_rotate_palette_colors() {
        let mut editor = RoiEditor::new();
        draw_rect(&mut editor, 0.0, 0.0, 50.0, 50.0);
        editor.set_tool(Tool::Rectangle);
        draw_rect(&mut editor, 60.0, 0.0, 120.0, 50.0);

        let first = editor.rois()[0].color().unwrap().to_string();
        let second = editor.rois()[1].color().unwrap().to_string();
        assert_ne!(first, second);
    }
}
